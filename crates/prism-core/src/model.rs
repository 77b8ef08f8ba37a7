use crate::error::{PrismError, Result};
use crate::paths;
use crate::types::{Level, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One entity of the hierarchy. The `level` fixes what it may contain:
/// Phases hold Milestones, Milestones hold Blocks, Blocks hold Tasks and
/// Tasks hold Subtasks. Sibling order is the order of `children`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Work time recorded directly on this node (Subtasks and leaf Tasks).
    #[serde(default, skip_serializing_if = "Duration::is_zero")]
    pub time_spent: Duration,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    /// Validated constructor. The label defaults to the id when blank.
    pub fn new(level: Level, id: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        let id = id.into();
        paths::validate_id_for(level, &id)?;
        let label = label.into();
        let label = if label.trim().is_empty() {
            id.clone()
        } else {
            label.trim().to_string()
        };
        let now = Utc::now();
        Ok(Self {
            id,
            label,
            level,
            reason: None,
            status: Status::Pending,
            tags: Vec::new(),
            time_spent: Duration::ZERO,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            children: Vec::new(),
        })
    }

    pub fn phase(id: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        Self::new(Level::Phase, id, label)
    }

    /// A Milestone is identified by its semantic version label, e.g. `0.1.x`.
    pub fn milestone(version: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        Self::new(Level::Milestone, version, label)
    }

    /// A Block is identified by a concrete release version, e.g. `1.0.0`.
    pub fn block(version: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        Self::new(Level::Block, version, label)
    }

    pub fn task(id: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        Self::new(Level::Task, id, label)
    }

    pub fn subtask(id: impl Into<String>, label: impl Into<String>) -> Result<Self> {
        Self::new(Level::Subtask, id, label)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.reason = (!reason.trim().is_empty()).then_some(reason);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// For Milestones and Blocks the identifier doubles as the version label.
    pub fn version(&self) -> Option<&str> {
        matches!(self.level, Level::Milestone | Level::Block).then_some(self.id.as_str())
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaves of the Task/Subtask tiers are the only nodes whose status comes
    /// from the caller.
    pub fn status_is_direct(&self) -> bool {
        self.level.accepts_direct_status() && self.is_leaf()
    }

    pub fn child(&self, id: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.id == id)
    }

    pub fn child_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|c| c.id == id)
    }

    pub fn child_index(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|c| c.id == id)
    }

    /// Set `status`, maintaining the started/finished stamps. Returns whether
    /// anything changed.
    pub(crate) fn apply_status(&mut self, status: Status, now: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        match status {
            Status::InProgress if self.started_at.is_none() => self.started_at = Some(now),
            Status::Completed => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
                self.finished_at = Some(now);
            }
            _ => {}
        }
        if status != Status::Completed {
            self.finished_at = None;
        }
        self.status = status;
        self.updated_at = now;
        true
    }

    /// Own time plus every descendant's.
    pub fn total_time(&self) -> Duration {
        self.children
            .iter()
            .fold(self.time_spent, |acc, c| acc + c.total_time())
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }

    /// Structural checks for a node read from disk: identifier rules, level
    /// nesting and sibling uniqueness, applied recursively.
    pub(crate) fn check(&self, expected: Level) -> std::result::Result<(), String> {
        if self.level != expected {
            return Err(format!(
                "'{}' is a {} but sits where a {} belongs",
                self.id, self.level, expected
            ));
        }
        paths::validate_id_for(self.level, &self.id).map_err(|e| e.to_string())?;
        if self.label.trim().is_empty() {
            return Err(format!("'{}' has an empty label", self.id));
        }
        if let (Some(start), Some(end)) = (self.started_at, self.finished_at) {
            if end < start {
                return Err(format!("'{}' finished before it started", self.id));
            }
        }
        if self.children.is_empty() {
            return Ok(());
        }
        let Some(child_level) = self.level.child() else {
            return Err(format!("subtask '{}' cannot have children", self.id));
        };
        check_siblings(&self.children, child_level)
            .map_err(|e| format!("under '{}': {e}", self.id))
    }
}

pub(crate) fn check_siblings(nodes: &[Node], level: Level) -> std::result::Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(format!("duplicate identifier '{}'", node.id));
        }
        node.check(level)?;
    }
    Ok(())
}

pub(crate) fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.into().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Descriptive fields accepted by `edit`.
#[derive(Debug, Clone, Default)]
pub struct NodePatch {
    pub label: Option<String>,
    pub reason: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NodePatch {
    pub(crate) fn apply(self, node: &mut Node, now: DateTime<Utc>) -> Result<()> {
        if let Some(label) = self.label {
            if label.trim().is_empty() {
                return Err(PrismError::validation("label must not be empty"));
            }
            node.label = label.trim().to_string();
        }
        if let Some(reason) = self.reason {
            node.reason = (!reason.trim().is_empty()).then_some(reason);
        }
        if let Some(tags) = self.tags {
            node.tags = normalize_tags(tags);
        }
        node.updated_at = now;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
