//! Rotating backups of the state file.
//!
//! Backups live in `.prsm/backups/` as
//! `state.<seq>.<UTC timestamp>[.<name>].yaml`. The sequence number grows
//! monotonically and orders backups by recency; the timestamp is informational.

use crate::error::{PrismError, Result};
use crate::{io, paths};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    /// File name without the `.yaml` extension.
    pub id: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: PathBuf,
    pub size: u64,
}

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,39}$").unwrap())
}

pub fn validate_name(name: &str) -> Result<()> {
    if !name_re().is_match(name) {
        return Err(PrismError::Validation(format!(
            "invalid backup name '{name}': use up to 40 letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

/// Copy `source` into a new backup slot.
pub fn create(root: &Path, source: &Path, name: Option<&str>) -> Result<BackupInfo> {
    if let Some(name) = name {
        validate_name(name)?;
    }
    let data = std::fs::read(source)?;
    let seq = list(root)?.first().map_or(1, |b| b.seq + 1);
    let created_at = Utc::now();
    let id = match name {
        Some(name) => format!(
            "{}.{seq:06}.{}.{name}",
            paths::STATE_STEM,
            created_at.format(TIMESTAMP_FORMAT)
        ),
        None => format!(
            "{}.{seq:06}.{}",
            paths::STATE_STEM,
            created_at.format(TIMESTAMP_FORMAT)
        ),
    };
    let path = paths::backup_path(root, &format!("{id}.yaml"));
    io::atomic_write(&path, &data)?;
    tracing::debug!(backup = %id, "created backup");
    parse_file_name(&path, data.len() as u64)
        .ok_or_else(|| PrismError::validation(format!("could not name backup '{id}'")))
}

/// All backups, newest first.
pub fn list(root: &Path) -> Result<Vec<BackupInfo>> {
    let dir = paths::backups_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let size = entry.metadata()?.len();
        if let Some(info) = parse_file_name(&entry.path(), size) {
            out.push(info);
        }
    }
    out.sort_by(|a, b| b.seq.cmp(&a.seq));
    Ok(out)
}

/// Keep the newest `keep` backups and delete the rest. Returns the evicted
/// backups.
pub fn rotate(root: &Path, keep: usize) -> Result<Vec<BackupInfo>> {
    let all = list(root)?;
    let evicted: Vec<BackupInfo> = all.into_iter().skip(keep).collect();
    for backup in &evicted {
        std::fs::remove_file(&backup.path)?;
        tracing::debug!(backup = %backup.id, "evicted backup");
    }
    Ok(evicted)
}

/// Resolve a backup by full id, file name, sequence number or name. A name
/// shared by several backups resolves to the newest.
pub fn find(root: &Path, key: &str) -> Result<BackupInfo> {
    let key = key.trim();
    let key = key.strip_suffix(".yaml").unwrap_or(key);
    let seq: Option<u64> = key.parse().ok();
    list(root)?
        .into_iter()
        .find(|b| b.id == key || Some(b.seq) == seq || b.name.as_deref() == Some(key))
        .ok_or_else(|| PrismError::NotFound(format!("backup '{key}'")))
}

fn parse_file_name(path: &Path, size: u64) -> Option<BackupInfo> {
    let file_name = path.file_name()?.to_str()?;
    let id = file_name.strip_suffix(".yaml")?;
    let mut parts = id.split('.');
    if parts.next()? != paths::STATE_STEM {
        return None;
    }
    let seq = parts.next()?.parse().ok()?;
    let stamp = NaiveDateTime::parse_from_str(parts.next()?, TIMESTAMP_FORMAT).ok()?;
    let name = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return None;
    }
    Some(BackupInfo {
        id: id.to_string(),
        seq,
        created_at: stamp.and_utc(),
        name,
        path: path.to_path_buf(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let state = paths::state_path(dir.path());
        std::fs::create_dir_all(state.parent().unwrap()).unwrap();
        std::fs::write(&state, b"schema_version: 2\n").unwrap();
        (dir, state)
    }

    #[test]
    fn create_numbers_backups() {
        let (dir, state) = setup();
        let a = create(dir.path(), &state, None).unwrap();
        let b = create(dir.path(), &state, Some("before-refactor")).unwrap();
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
        assert_eq!(b.name.as_deref(), Some("before-refactor"));
        assert!(b.id.starts_with("state.000002."));
        assert_eq!(
            std::fs::read(&b.path).unwrap(),
            std::fs::read(&state).unwrap()
        );
    }

    #[test]
    fn list_is_newest_first() {
        let (dir, state) = setup();
        for _ in 0..3 {
            create(dir.path(), &state, None).unwrap();
        }
        let seqs: Vec<u64> = list(dir.path()).unwrap().iter().map(|b| b.seq).collect();
        assert_eq!(seqs, vec![3, 2, 1]);
    }

    #[test]
    fn rotate_evicts_oldest() {
        let (dir, state) = setup();
        for _ in 0..5 {
            create(dir.path(), &state, None).unwrap();
        }
        let evicted = rotate(dir.path(), 2).unwrap();
        assert_eq!(evicted.len(), 3);
        let left: Vec<u64> = list(dir.path()).unwrap().iter().map(|b| b.seq).collect();
        assert_eq!(left, vec![5, 4]);
        // numbering continues after eviction
        assert_eq!(create(dir.path(), &state, None).unwrap().seq, 6);
    }

    #[test]
    fn find_by_seq_name_or_id() {
        let (dir, state) = setup();
        let first = create(dir.path(), &state, Some("nightly")).unwrap();
        let second = create(dir.path(), &state, None).unwrap();
        assert_eq!(find(dir.path(), "2").unwrap(), second);
        assert_eq!(find(dir.path(), "nightly").unwrap(), first);
        assert_eq!(find(dir.path(), &first.id).unwrap(), first);
        assert_eq!(
            find(dir.path(), &format!("{}.yaml", second.id)).unwrap(),
            second
        );
        assert!(matches!(
            find(dir.path(), "missing"),
            Err(PrismError::NotFound(_))
        ));
    }

    #[test]
    fn bad_names_and_foreign_files() {
        let (dir, state) = setup();
        assert!(create(dir.path(), &state, Some("has.dot")).is_err());
        std::fs::create_dir_all(paths::backups_dir(dir.path())).unwrap();
        std::fs::write(paths::backup_path(dir.path(), "notes.txt"), b"x").unwrap();
        assert!(list(dir.path()).unwrap().is_empty());
    }
}
