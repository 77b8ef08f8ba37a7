pub mod backup;
pub mod edit;
pub mod init;
pub mod nav;
pub mod show;
pub mod structure;
pub mod timer;

use anyhow::Context;
use prism_core::{Project, Store, TaskPath};
use std::path::Path;

/// A loaded project plus the store it came from. Commands load once, apply
/// one core operation and save.
pub struct Session {
    pub store: Store,
    pub project: Project,
}

impl Session {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let store = Store::open(root)
            .with_context(|| format!("no prism project at {}", root.display()))?;
        for warning in store.config().validate() {
            tracing::warn!("config: {warning}");
        }
        let loaded = store.load().context("failed to load project state")?;
        if let Some(warning) = &loaded.warning {
            eprintln!("warning: {warning}");
        }
        Ok(Self {
            store,
            project: loaded.project,
        })
    }

    pub fn save(&mut self) -> anyhow::Result<()> {
        self.store
            .save(&mut self.project)
            .context("failed to save project state")
    }

    /// Resolve a user-supplied path. `.` is the cursor, `..` its parent, and
    /// `./x` or `../x` are relative to the cursor. `/` is the project root.
    /// Anything else is taken from the root.
    pub fn resolve(&self, raw: &str) -> anyhow::Result<TaskPath> {
        resolve_against(self.project.cursor().path(), raw)
    }
}

fn resolve_against(cursor: &TaskPath, raw: &str) -> anyhow::Result<TaskPath> {
    let raw = raw.trim();
    let (mut base, rest) = if raw == "." || raw == ".." {
        (cursor.clone(), raw)
    } else if let Some(rest) = raw.strip_prefix("./") {
        (cursor.clone(), rest)
    } else if raw.starts_with("../") {
        (cursor.clone(), raw)
    } else {
        return TaskPath::parse(raw).with_context(|| format!("invalid path '{raw}'"));
    };
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        base = match segment {
            "." => base,
            ".." => base
                .parent()
                .with_context(|| format!("'{raw}' climbs above the project root"))?,
            id => TaskPath::from_segments(base.segments().iter().cloned().chain([id.to_string()]))
                .with_context(|| format!("invalid path '{raw}'"))?,
        };
    }
    Ok(base)
}
