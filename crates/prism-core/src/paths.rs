use crate::error::{PrismError, Result};
use crate::types::Level;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PRSM_DIR: &str = ".prsm";
pub const BACKUPS_DIR: &str = ".prsm/backups";

pub const STATE_FILE: &str = ".prsm/state.yaml";
pub const LOCK_FILE: &str = ".prsm/state.lock";
pub const CONFIG_FILE: &str = ".prsm/config.yaml";

/// File-name prefix shared by the state file's temp siblings and backups.
pub const STATE_STEM: &str = "state";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn prsm_dir(root: &Path) -> PathBuf {
    root.join(PRSM_DIR)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn backups_dir(root: &Path) -> PathBuf {
    root.join(BACKUPS_DIR)
}

pub fn backup_path(root: &Path, file_name: &str) -> PathBuf {
    backups_dir(root).join(file_name)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static ID_RE: OnceLock<Regex> = OnceLock::new();
static VERSION_RE: OnceLock<Regex> = OnceLock::new();
static CONCRETE_VERSION_RE: OnceLock<Regex> = OnceLock::new();

fn id_re() -> &'static Regex {
    ID_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._ \-]*[A-Za-z0-9._\-])?$").unwrap()
    })
}

fn version_re() -> &'static Regex {
    VERSION_RE.get_or_init(|| Regex::new(r"^\d+\.\d+(?:\.\d+)?(?:\.[x*])?$").unwrap())
}

fn concrete_version_re() -> &'static Regex {
    CONCRETE_VERSION_RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap())
}

pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !id_re().is_match(id) {
        return Err(PrismError::Validation(format!(
            "invalid identifier '{id}': must start with a letter or digit and contain only \
             letters, digits, '.', '_', '-' or inner spaces"
        )));
    }
    Ok(())
}

/// Check the identifier rules for a node of `level`. Milestones and Blocks are
/// identified by their version label; a Block needs a concrete version.
pub fn validate_id_for(level: Level, id: &str) -> Result<()> {
    validate_id(id)?;
    match level {
        Level::Milestone if !version_re().is_match(id) => Err(PrismError::Validation(format!(
            "invalid milestone version '{id}': expected e.g. 0.1.x or 1.2"
        ))),
        Level::Block if !concrete_version_re().is_match(id) => Err(PrismError::Validation(
            format!("invalid block version '{id}': expected major.minor.patch, e.g. 0.1.1"),
        )),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        for id in ["alpha", "data-model", "task 1", "v2", "0.1.x", "a_b"] {
            validate_id(id).unwrap_or_else(|_| panic!("expected valid: {id}"));
        }
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "-lead", " padded", "trailing ", "a/b", "tab\there"] {
            assert!(validate_id(id).is_err(), "expected invalid: {id:?}");
        }
    }

    #[test]
    fn version_rules_per_level() {
        validate_id_for(Level::Milestone, "0.1.x").unwrap();
        validate_id_for(Level::Milestone, "3.2").unwrap();
        validate_id_for(Level::Block, "0.1.1").unwrap();
        assert!(validate_id_for(Level::Milestone, "beta").is_err());
        assert!(validate_id_for(Level::Block, "0.1.x").is_err());
        validate_id_for(Level::Task, "beta").unwrap();
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(state_path(root), PathBuf::from("/tmp/proj/.prsm/state.yaml"));
        assert_eq!(lock_path(root), PathBuf::from("/tmp/proj/.prsm/state.lock"));
        assert_eq!(
            backup_path(root, "state.000001.yaml"),
            PathBuf::from("/tmp/proj/.prsm/backups/state.000001.yaml")
        );
    }
}
