use crate::error::{PrismError, Result};
use crate::types::Level;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of segments: phase/milestone/block/task/subtask.
pub const MAX_DEPTH: usize = 5;

/// Address of an entity as the chain of identifiers from its Phase down,
/// written `alpha/0.1.x/0.1.1/data-model/schema`. The empty path is the
/// (implicit) project root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskPath(Vec<String>);

impl TaskPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(PrismError::Validation(format!(
                "invalid task path '{raw}': empty segment"
            )));
        }
        Self::from_segments(segments)
    }

    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.len() > MAX_DEPTH {
            return Err(PrismError::Validation(format!(
                "invalid task path '{}': at most {MAX_DEPTH} segments",
                segments.join("/")
            )));
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Level of the entity this path addresses; `None` for the root.
    pub fn level(&self) -> Option<Level> {
        self.0.len().checked_sub(1).and_then(Level::at_depth)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<TaskPath> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn join(&self, id: impl Into<String>) -> TaskPath {
        let mut segments = self.0.clone();
        segments.push(id.into());
        Self(segments)
    }

    pub fn prefix(&self, len: usize) -> TaskPath {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// True when `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &TaskPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Replace the leading `from` prefix with `to`. Returns `None` when `self`
    /// is not under `from`.
    pub fn rebase(&self, from: &TaskPath, to: &TaskPath) -> Option<TaskPath> {
        if !self.starts_with(from) {
            return None;
        }
        let mut segments = to.0.clone();
        segments.extend_from_slice(&self.0[from.0.len()..]);
        Some(Self(segments))
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        f.write_str(&self.0.join("/"))
    }
}

impl std::str::FromStr for TaskPath {
    type Err = PrismError;

    fn from_str(s: &str) -> Result<Self> {
        TaskPath::parse(s)
    }
}
