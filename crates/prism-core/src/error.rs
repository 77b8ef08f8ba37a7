use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrismError {
    #[error("not initialized: run 'prsm init'")]
    NotInitialized,

    #[error("already initialized: {0}")]
    AlreadyInitialized(PathBuf),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("cursor is already at the {0} of the tree")]
    Boundary(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("state is locked by process {pid} since {acquired_at}")]
    Concurrency {
        pid: u32,
        acquired_at: DateTime<Utc>,
    },

    #[error("corrupt state in {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("state file was unreadable ({cause}); recovered from backup {backup}")]
    RecoveredFromBackup { backup: String, cause: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PrismError>;

/// Coarse error category for callers that only need to branch on the kind,
/// e.g. to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Concurrency,
    Corruption,
    UnsupportedVersion,
    Warning,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Concurrency => "concurrency",
            ErrorKind::Corruption => "corruption",
            ErrorKind::UnsupportedVersion => "unsupported_version",
            ErrorKind::Warning => "warning",
            ErrorKind::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PrismError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrismError::Validation(_)
            | PrismError::InvalidTransition { .. }
            | PrismError::AlreadyInitialized(_) => ErrorKind::Validation,
            PrismError::NotFound(_) | PrismError::NotInitialized | PrismError::Boundary(_) => {
                ErrorKind::NotFound
            }
            PrismError::Conflict(_) => ErrorKind::Conflict,
            PrismError::Concurrency { .. } => ErrorKind::Concurrency,
            PrismError::CorruptState { .. } | PrismError::Yaml(_) | PrismError::Json(_) => {
                ErrorKind::Corruption
            }
            PrismError::UnsupportedVersion { .. } => ErrorKind::UnsupportedVersion,
            PrismError::RecoveredFromBackup { .. } => ErrorKind::Warning,
            PrismError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        PrismError::Validation(msg.into())
    }

    pub(crate) fn not_found(what: impl fmt::Display) -> Self {
        PrismError::NotFound(what.to_string())
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        PrismError::CorruptState {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_taxonomy() {
        assert_eq!(
            PrismError::validation("bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(PrismError::not_found("a/b").kind(), ErrorKind::NotFound);
        assert_eq!(PrismError::Boundary("end").kind(), ErrorKind::NotFound);
        assert_eq!(
            PrismError::Conflict("x".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            PrismError::Concurrency {
                pid: 1,
                acquired_at: Utc::now()
            }
            .kind(),
            ErrorKind::Concurrency
        );
        assert_eq!(
            PrismError::corrupt("/tmp/state.yaml", "truncated").kind(),
            ErrorKind::Corruption
        );
        assert_eq!(
            PrismError::UnsupportedVersion {
                found: 9,
                supported: 2
            }
            .kind(),
            ErrorKind::UnsupportedVersion
        );
        assert_eq!(
            PrismError::RecoveredFromBackup {
                backup: "state.000001".into(),
                cause: "eof".into()
            }
            .kind(),
            ErrorKind::Warning
        );
    }

    #[test]
    fn messages_carry_context() {
        let err = PrismError::corrupt("/p/.prsm/state.yaml", "missing field `phases`");
        let msg = err.to_string();
        assert!(msg.contains("/p/.prsm/state.yaml"));
        assert!(msg.contains("missing field"));
    }
}
