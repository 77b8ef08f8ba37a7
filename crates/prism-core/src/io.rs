use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// The temp file is flushed to disk before the rename, so a crash leaves
/// either the old file or the new one.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;
    let prefix = temp_prefix(path);
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "persisting temp file");
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Temp files for `state.yaml` are named `.state.yaml.XXXXXX`.
fn temp_prefix(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(".{name}.")
}

/// Remove leftover temp siblings of `path` from interrupted writes.
/// Returns how many were removed.
pub fn sweep_temp_files(path: &Path) -> Result<usize> {
    let Some(dir) = path.parent() else {
        return Ok(0);
    };
    if !dir.exists() {
        return Ok(0);
    }
    let prefix = temp_prefix(path);
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(&prefix) && entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
            tracing::debug!(file = %entry.path().display(), "removed stale temp file");
            removed += 1;
        }
    }
    Ok(removed)
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}
