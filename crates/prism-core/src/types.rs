use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Work status of any entity. Declaration order is the progression order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Blocked,
    Completed,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[
            Status::Pending,
            Status::InProgress,
            Status::Blocked,
            Status::Completed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::PrismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "todo" => Ok(Status::Pending),
            "in_progress" | "in-progress" | "active" => Ok(Status::InProgress),
            "blocked" => Ok(Status::Blocked),
            "completed" | "done" => Ok(Status::Completed),
            _ => Err(crate::error::PrismError::Validation(format!(
                "unknown status '{s}' (expected pending, in_progress, blocked or completed)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// Tier of the hierarchy. Depth 0 is a Phase, depth 4 a Subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Phase,
    Milestone,
    Block,
    Task,
    Subtask,
}

impl Level {
    pub fn all() -> &'static [Level] {
        &[
            Level::Phase,
            Level::Milestone,
            Level::Block,
            Level::Task,
            Level::Subtask,
        ]
    }

    pub fn depth(self) -> usize {
        self as usize
    }

    pub fn at_depth(depth: usize) -> Option<Level> {
        Level::all().get(depth).copied()
    }

    pub fn child(self) -> Option<Level> {
        Level::at_depth(self.depth() + 1)
    }

    /// Whether a node of this level may take its status from the caller
    /// (provided it has no children).
    pub fn accepts_direct_status(self) -> bool {
        matches!(self, Level::Task | Level::Subtask)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Phase => "phase",
            Level::Milestone => "milestone",
            Level::Block => "block",
            Level::Task => "task",
            Level::Subtask => "subtask",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_aliases() {
        assert_eq!("done".parse::<Status>().unwrap(), Status::Completed);
        assert_eq!("in-progress".parse::<Status>().unwrap(), Status::InProgress);
        assert!("finished".parse::<Status>().is_err());
    }

    #[test]
    fn status_display_matches_serde() {
        for s in Status::all() {
            let yaml = serde_yaml::to_string(s).unwrap();
            assert_eq!(yaml.trim(), s.as_str());
        }
    }

    #[test]
    fn level_chain() {
        assert_eq!(Level::Phase.child(), Some(Level::Milestone));
        assert_eq!(Level::Task.child(), Some(Level::Subtask));
        assert_eq!(Level::Subtask.child(), None);
        assert_eq!(Level::at_depth(2), Some(Level::Block));
        assert_eq!(Level::at_depth(5), None);
    }
}
