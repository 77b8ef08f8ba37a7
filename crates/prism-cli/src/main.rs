mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{backup::BackupSubcommand, nav::Move, structure::AddArgs, timer::TimerSubcommand};
use prism_core::{ErrorKind, PrismError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "prsm",
    about = "Track phases, milestones, blocks and tasks with a built-in work timer",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .prsm/)
    #[arg(long, global = true, env = "PRSM_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project in the current directory
    Init {
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the hierarchy, or one entity
    Show { path: Option<String> },

    /// Add an entity; its tier follows from the parent (`/` adds a phase)
    Add {
        parent: String,
        id: String,
        #[arg(long)]
        label: Option<String>,
        /// Why this is needed
        #[arg(long)]
        reason: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Position among siblings (default: last)
        #[arg(long)]
        at: Option<usize>,
    },

    /// Delete an entity and everything under it
    Rm { path: String },

    /// Move an entity under a new parent, or reorder it with --at
    Mv {
        path: String,
        new_parent: String,
        #[arg(long)]
        at: Option<usize>,
    },

    /// Set the status of a task or subtask (pending, in_progress, blocked, completed)
    Status { path: String, status: String },

    /// Edit label, reason or tags
    Edit {
        path: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        /// Replace the tags (repeatable)
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },

    /// Work timer
    Timer {
        #[command(subcommand)]
        subcommand: TimerSubcommand,
    },

    /// Move the cursor to a path
    Cd { path: String },

    /// Cursor to the next entity at the same depth
    Next,

    /// Cursor to the previous entity at the same depth
    Prev,

    /// Cursor to the first child
    Enter,

    /// Cursor to the parent
    Up,

    /// Print the cursor position
    Pwd,

    /// Manage state backups
    Backup {
        #[command(subcommand)]
        subcommand: BackupSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if std::env::var("PRSM_DEBUG").is_ok_and(|v| v == "1") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref(), json),
        Commands::Show { path } => cmd::show::run(&root, path.as_deref(), json),
        Commands::Add {
            parent,
            id,
            label,
            reason,
            tags,
            at,
        } => cmd::structure::add(
            &root,
            AddArgs {
                parent: &parent,
                id: &id,
                label: label.as_deref(),
                reason: reason.as_deref(),
                tags: &tags,
                at,
            },
            json,
        ),
        Commands::Rm { path } => cmd::structure::remove(&root, &path, json),
        Commands::Mv {
            path,
            new_parent,
            at,
        } => cmd::structure::mv(&root, &path, &new_parent, at, json),
        Commands::Status { path, status } => {
            cmd::structure::set_status(&root, &path, &status, json)
        }
        Commands::Edit {
            path,
            label,
            reason,
            tags,
        } => cmd::edit::run(&root, &path, label, reason, tags, json),
        Commands::Timer { subcommand } => cmd::timer::run(&root, subcommand, json),
        Commands::Cd { path } => cmd::nav::cd(&root, &path, json),
        Commands::Next => cmd::nav::step(&root, Move::Next, json),
        Commands::Prev => cmd::nav::step(&root, Move::Prev, json),
        Commands::Enter => cmd::nav::step(&root, Move::Enter, json),
        Commands::Up => cmd::nav::step(&root, Move::Up, json),
        Commands::Pwd => cmd::nav::pwd(&root, json),
        Commands::Backup { subcommand } => cmd::backup::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// Exit code for the first core error in the chain.
fn exit_code(err: &anyhow::Error) -> i32 {
    let kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<PrismError>())
        .map(PrismError::kind);
    match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::Conflict) => 4,
        Some(ErrorKind::Concurrency) => 5,
        Some(ErrorKind::Corruption) => 6,
        Some(ErrorKind::UnsupportedVersion) => 7,
        Some(ErrorKind::Warning | ErrorKind::Io) | None => 1,
    }
}
