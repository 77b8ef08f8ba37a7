use crate::error::{PrismError, Result};
use crate::paths;
use crate::status::TieBreak;
use crate::timer::StartPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Rotating backup slots kept beside the state file. 0 disables backups.
    #[serde(default = "default_backup_keep")]
    pub keep: usize,
}

fn default_backup_keep() -> usize {
    10
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            keep: default_backup_keep(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default)]
    pub on_start_while_running: StartPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_keep")]
    pub keep: usize,
}

fn default_history_keep() -> usize {
    500
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            keep: default_history_keep(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

/// Optional per-project settings read from `.prsm/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backups: BackupConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Config {
    /// Defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data).map_err(|e| PrismError::corrupt(&path, e))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Settings that load fine but are probably not what the user meant.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.backups.keep == 0 {
            warnings.push("backups.keep is 0: saves will not keep any backups".to_string());
        }
        if self.history.keep == 0 {
            warnings.push("history.keep is 0: timer sessions will not be logged".to_string());
        }
        warnings
    }
}
