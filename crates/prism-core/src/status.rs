//! Derived status propagation.
//!
//! Only leaf Tasks and Subtasks carry a status chosen by the caller. Every
//! node with children takes its status from them, recomputed bottom-up after
//! each mutation. A Phase, Milestone or Block without children is pending.

use crate::model::Node;
use crate::task_path::TaskPath;
use crate::tree::Tree;
use crate::types::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which status wins when a parent has both a blocked and an in-progress
/// child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    InProgress,
    Blocked,
}

/// Status of a parent whose children have `statuses`. `None` when there are
/// no children.
///
/// Rules, in order: all completed → completed; all pending → pending;
/// a blocked child with no in-progress sibling → blocked; anything else
/// (an in-progress child, or a pending/completed mix) → in progress.
pub fn derive<I>(statuses: I, tie: TieBreak) -> Option<Status>
where
    I: IntoIterator<Item = Status>,
{
    let mut any = false;
    let (mut pending, mut in_progress, mut blocked, mut completed) = (false, false, false, false);
    for s in statuses {
        any = true;
        match s {
            Status::Pending => pending = true,
            Status::InProgress => in_progress = true,
            Status::Blocked => blocked = true,
            Status::Completed => completed = true,
        }
    }
    if !any {
        return None;
    }
    let status = if !pending && !in_progress && !blocked {
        Status::Completed
    } else if !in_progress && !blocked && !completed {
        Status::Pending
    } else if blocked && (!in_progress || tie == TieBreak::Blocked) {
        Status::Blocked
    } else {
        Status::InProgress
    };
    Some(status)
}

/// Recompute `path` (if it has children) and every ancestor up to its Phase.
/// Returns the number of nodes whose status changed.
pub fn recompute(tree: &mut Tree, path: &TaskPath, tie: TieBreak) -> usize {
    let now = Utc::now();
    let mut changed = 0;
    for len in (1..=path.len()).rev() {
        let Ok(node) = tree.get_mut(&path.prefix(len)) else {
            continue;
        };
        if refresh(node, tie, now) {
            changed += 1;
        }
    }
    if changed > 0 {
        tree.mark_dirty();
    }
    changed
}

/// Recompute every container in the tree, children before parents.
pub fn recompute_all(tree: &mut Tree, tie: TieBreak) -> usize {
    fn visit(node: &mut Node, tie: TieBreak, now: DateTime<Utc>) -> usize {
        let below: usize = node
            .children
            .iter_mut()
            .map(|c| visit(c, tie, now))
            .sum();
        below + usize::from(refresh(node, tie, now))
    }
    let now = Utc::now();
    let changed: usize = tree
        .phases_mut()
        .iter_mut()
        .map(|p| visit(p, tie, now))
        .sum();
    if changed > 0 {
        tree.mark_dirty();
    }
    changed
}

fn refresh(node: &mut Node, tie: TieBreak, now: DateTime<Utc>) -> bool {
    match derive(node.children.iter().map(|c| c.status), tie) {
        Some(status) => node.apply_status(status, now),
        None if !node.level.accepts_direct_status() => node.apply_status(Status::Pending, now),
        None => false,
    }
}
