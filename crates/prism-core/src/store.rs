use crate::backup::{self, BackupInfo};
use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{PrismError, Result};
use crate::migrations::{self, SCHEMA_VERSION};
use crate::project::{Policies, Project};
use crate::timer::{Clock, SystemClock, TimeEntry, Timer, TimerSnapshot};
use crate::tree::Tree;
use crate::types::Level;
use crate::{io, lock, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// On-disk document
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    schema_version: u32,
    project: String,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    phases: Tree,
    #[serde(default)]
    timer: TimerSnapshot,
    #[serde(default)]
    cursor: Cursor,
    #[serde(default)]
    history: Vec<TimeEntry>,
}

impl StateDocument {
    fn from_project(project: &Project, released: bool) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            project: project.name().to_string(),
            updated_at: project.clock().wall(),
            phases: project.tree().clone(),
            timer: project.timer().snapshot(project.clock(), released),
            cursor: project.cursor().clone(),
            history: project.history().to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Result of [`Store::load`]. `warning` carries a `RecoveredFromBackup` error
/// when the state file was unusable and a backup was loaded instead.
#[derive(Debug)]
pub struct Loaded {
    pub project: Project,
    pub warning: Option<PrismError>,
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub restored: BackupInfo,
    /// Backup of the state that was replaced, if there was one.
    pub safety: Option<BackupInfo>,
}

/// Persistence for one project root.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl Store {
    /// Open an initialized project rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        if !paths::prsm_dir(root).is_dir() {
            return Err(PrismError::NotInitialized);
        }
        Ok(Self {
            root: root.to_path_buf(),
            config: Config::load(root)?,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create `.prsm/` with a default config and an empty project.
    pub fn init(root: &Path, name: &str) -> Result<(Self, Project)> {
        if paths::state_path(root).exists() {
            return Err(PrismError::AlreadyInitialized(root.to_path_buf()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(PrismError::validation("project name must not be empty"));
        }
        io::ensure_dir(&paths::prsm_dir(root))?;
        if !paths::config_path(root).exists() {
            Config::default().save(root)?;
        }
        let store = Self::open(root)?;
        let mut project = Project::new(name)
            .with_policies(Policies::from(&store.config))
            .with_clock(Arc::clone(&store.clock));
        store.save(&mut project)?;
        tracing::debug!(root = %root.display(), "initialized project");
        Ok((store, project))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state_path(&self) -> PathBuf {
        paths::state_path(&self.root)
    }

    // ---------------------------------------------------------------------------
    // Load
    // ---------------------------------------------------------------------------

    /// Read, migrate and validate the state file. Never takes the lock.
    ///
    /// An unreadable or invalid file is replaced in memory by the newest
    /// backup that loads cleanly; the returned `warning` says so.
    pub fn load(&self) -> Result<Loaded> {
        let path = self.state_path();
        let cause = if path.exists() {
            match self.read_document(&path) {
                Ok(project) => {
                    return Ok(Loaded {
                        project,
                        warning: None,
                    })
                }
                Err(e @ PrismError::CorruptState { .. }) => e,
                Err(e) => return Err(e),
            }
        } else {
            PrismError::corrupt(&path, "state file is missing")
        };

        let backups = backup::list(&self.root)?;
        if backups.is_empty() && !path.exists() {
            return Err(PrismError::NotInitialized);
        }
        for candidate in &backups {
            match self.read_document(&candidate.path) {
                Ok(mut project) => {
                    tracing::warn!(
                        backup = %candidate.id,
                        cause = %cause,
                        "state file unusable; recovered from backup"
                    );
                    project.mark_dirty();
                    return Ok(Loaded {
                        project,
                        warning: Some(PrismError::RecoveredFromBackup {
                            backup: candidate.id.clone(),
                            cause: cause.to_string(),
                        }),
                    });
                }
                Err(e) => {
                    tracing::debug!(backup = %candidate.id, "backup unusable: {e}");
                }
            }
        }
        Err(cause)
    }

    fn read_document(&self, path: &Path) -> Result<Project> {
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                PrismError::Io(e)
            }
            _ => PrismError::corrupt(path, e),
        })?;
        let raw: serde_yaml::Value =
            serde_yaml::from_slice(&data).map_err(|e| PrismError::corrupt(path, e))?;
        if raw.is_null() {
            return Err(PrismError::corrupt(path, "state file is empty"));
        }
        let raw = migrations::migrate(raw, path)?;
        let doc: StateDocument =
            serde_yaml::from_value(raw).map_err(|e| PrismError::corrupt(path, e))?;

        doc.phases
            .check()
            .map_err(|e| PrismError::corrupt(path, e))?;
        if let Some(target) = doc.timer.target() {
            match doc.phases.get(target) {
                Ok(node) if node.level == Level::Subtask => {}
                _ => {
                    return Err(PrismError::corrupt(
                        path,
                        format!("timer target '{target}' is not an existing subtask"),
                    ))
                }
            }
        }

        let restored = Timer::restore(&doc.timer, self.clock.as_ref());
        if restored.interrupted {
            tracing::warn!(
                subtask = ?restored.timer.target().map(ToString::to_string),
                "timer was running when the previous session ended; restored as paused"
            );
        }
        let mut project = Project::from_parts(
            doc.project,
            doc.phases,
            restored.timer,
            doc.cursor,
            doc.history,
            Policies::from(&self.config),
            Arc::clone(&self.clock),
        );
        project.normalize();
        if restored.interrupted {
            project.mark_dirty();
        }
        tracing::debug!(path = %path.display(), "loaded state");
        Ok(project)
    }

    // ---------------------------------------------------------------------------
    // Save
    // ---------------------------------------------------------------------------

    /// Write `project` atomically under the lock, first rotating the previous
    /// file into the backups. A running timer is handed off to the next
    /// session and keeps running by wall clock.
    pub fn save(&self, project: &mut Project) -> Result<()> {
        let _lock = lock::acquire(&self.root)?;
        let path = self.state_path();
        let swept = io::sweep_temp_files(&path)?;
        if swept > 0 {
            tracing::debug!(swept, "removed temp files from interrupted writes");
        }
        if path.exists() && self.config.backups.keep > 0 {
            let info = backup::create(&self.root, &path, None)?;
            let evicted = backup::rotate(&self.root, self.config.backups.keep)?;
            tracing::debug!(backup = %info.id, evicted = evicted.len(), "rotated backups");
        }
        self.write(project, true)
    }

    /// Write `project` without rotating backups, marking a running timer as
    /// still owned by this session. If the process dies before the next
    /// checkpoint or save, the next load counts time only up to now.
    pub fn checkpoint(&self, project: &mut Project) -> Result<()> {
        let _lock = lock::acquire(&self.root)?;
        self.write(project, false)
    }

    fn write(&self, project: &mut Project, released: bool) -> Result<()> {
        let doc = StateDocument::from_project(project, released);
        let data = serde_yaml::to_string(&doc)?;
        io::atomic_write(&self.state_path(), data.as_bytes())?;
        project.mark_clean();
        tracing::debug!(path = %self.state_path().display(), released, "saved state");
        Ok(())
    }

    // ---------------------------------------------------------------------------
    // Backups
    // ---------------------------------------------------------------------------

    /// Snapshot the current state file on demand.
    pub fn backup(&self, name: Option<&str>) -> Result<BackupInfo> {
        let _lock = lock::acquire(&self.root)?;
        let path = self.state_path();
        if !path.exists() {
            return Err(PrismError::NotInitialized);
        }
        backup::create(&self.root, &path, name)
    }

    /// All backups, newest first.
    pub fn backups(&self) -> Result<Vec<BackupInfo>> {
        backup::list(&self.root)
    }

    /// Replace the state file with backup `id` after checking that it loads.
    /// The replaced state is kept as a safety backup.
    pub fn restore(&self, id: &str) -> Result<RestoreOutcome> {
        let _lock = lock::acquire(&self.root)?;
        let info = backup::find(&self.root, id)?;
        self.read_document(&info.path)?;
        let path = self.state_path();
        let safety = if path.exists() {
            Some(backup::create(&self.root, &path, None)?)
        } else {
            None
        };
        let data = std::fs::read(&info.path)?;
        io::atomic_write(&path, &data)?;
        if self.config.backups.keep > 0 {
            backup::rotate(&self.root, self.config.backups.keep)?;
        }
        tracing::debug!(backup = %info.id, "restored state from backup");
        Ok(RestoreOutcome {
            restored: info,
            safety,
        })
    }
}
