pub mod backup;
pub mod config;
pub mod cursor;
pub mod error;
pub mod io;
pub mod lock;
pub mod migrations;
pub mod model;
pub mod paths;
pub mod project;
pub mod status;
pub mod store;
pub mod task_path;
pub mod timer;
pub mod tree;
pub mod types;

pub use config::Config;
pub use error::{ErrorKind, PrismError, Result};
pub use model::{Node, NodePatch};
pub use project::{Policies, Project};
pub use store::{Loaded, RestoreOutcome, Store};
pub use task_path::TaskPath;
pub use timer::{Clock, ManualClock, SystemClock, TimeEntry, Timer, TimerState};
pub use types::{Level, Status};
