use crate::error::{PrismError, Result};
use crate::task_path::TaskPath;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};

/// Current navigation position. Either empty (the tree has no entities) or a
/// path that resolves in the tree it is used with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor {
    path: TaskPath,
}

impl Cursor {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn path(&self) -> &TaskPath {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_root()
    }

    pub fn set(&mut self, tree: &Tree, path: TaskPath) -> Result<()> {
        if path.is_root() {
            return Err(PrismError::validation(
                "cursor must point at an entity, not the project root",
            ));
        }
        tree.get(&path)?;
        self.path = path;
        Ok(())
    }

    /// Step to the next entity at the same depth, crossing into the next
    /// parent's first child when the current parent is exhausted.
    pub fn next(&mut self, tree: &Tree) -> Result<&TaskPath> {
        self.step(tree, 1)
    }

    /// Mirror of [`Cursor::next`].
    pub fn previous(&mut self, tree: &Tree) -> Result<&TaskPath> {
        self.step(tree, -1)
    }

    /// Descend to the first child.
    pub fn enter(&mut self, tree: &Tree) -> Result<&TaskPath> {
        self.revalidate(tree);
        let children = tree.children(&self.path)?;
        let first = children
            .first()
            .ok_or_else(|| PrismError::NotFound(format!("'{}' has no children", self.path)))?;
        self.path = self.path.join(first.id.clone());
        Ok(&self.path)
    }

    /// Ascend to the parent.
    pub fn leave(&mut self, tree: &Tree) -> Result<&TaskPath> {
        self.revalidate(tree);
        if self.path.len() <= 1 {
            return Err(PrismError::Boundary("top"));
        }
        self.path = self.path.parent().unwrap_or_default();
        Ok(&self.path)
    }

    fn step(&mut self, tree: &Tree, delta: isize) -> Result<&TaskPath> {
        self.revalidate(tree);
        let edge = if delta > 0 { "end" } else { "start" };
        if self.is_empty() {
            return Err(PrismError::Boundary(edge));
        }
        let row = tree.paths_at_depth(self.path.len());
        let idx = row
            .iter()
            .position(|p| *p == self.path)
            .ok_or_else(|| PrismError::not_found(&self.path))?;
        let target = idx
            .checked_add_signed(delta)
            .and_then(|i| row.get(i))
            .ok_or(PrismError::Boundary(edge))?;
        self.path = target.clone();
        Ok(&self.path)
    }

    /// Re-resolve against `tree`: keep the longest prefix that still exists,
    /// or fall back to the first Phase. Returns whether the cursor moved.
    pub fn revalidate(&mut self, tree: &Tree) -> bool {
        if !self.is_empty() && tree.contains(&self.path) {
            return false;
        }
        let prefix = tree.surviving_prefix(&self.path);
        let resolved = if !prefix.is_root() {
            prefix
        } else {
            tree.phases()
                .first()
                .map(|p| TaskPath::root().join(p.id.clone()))
                .unwrap_or_default()
        };
        let moved = resolved != self.path;
        self.path = resolved;
        moved
    }

    /// Follow a subtree that moved from `from` to `to`.
    pub(crate) fn rebase(&mut self, from: &TaskPath, to: &TaskPath) {
        if let Some(moved) = self.path.rebase(from, to) {
            self.path = moved;
        }
    }
}
