use crate::error::{PrismError, Result};
use crate::model::{self, Node};
use crate::task_path::TaskPath;
use crate::types::{Level, Status};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The whole hierarchy: an ordered list of Phases.
///
/// Every structural mutation marks the tree dirty; the persistence layer
/// clears the flag once the tree is on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tree {
    phases: Vec<Node>,
    #[serde(skip)]
    dirty: bool,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.phases == other.phases
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> &[Node] {
        &self.phases
    }

    pub(crate) fn phases_mut(&mut self) -> &mut Vec<Node> {
        &mut self.phases
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    // ---------------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------------

    pub fn get(&self, path: &TaskPath) -> Result<&Node> {
        let mut segments = path.segments().iter();
        let first = segments
            .next()
            .ok_or_else(|| PrismError::validation("the project root is not an entity"))?;
        let mut node = self
            .phases
            .iter()
            .find(|n| &n.id == first)
            .ok_or_else(|| PrismError::not_found(path))?;
        for id in segments {
            node = node.child(id).ok_or_else(|| PrismError::not_found(path))?;
        }
        Ok(node)
    }

    pub fn get_mut(&mut self, path: &TaskPath) -> Result<&mut Node> {
        let mut segments = path.segments().iter();
        let first = segments
            .next()
            .ok_or_else(|| PrismError::validation("the project root is not an entity"))?;
        let mut node = self
            .phases
            .iter_mut()
            .find(|n| &n.id == first)
            .ok_or_else(|| PrismError::not_found(path))?;
        for id in segments {
            node = node
                .child_mut(id)
                .ok_or_else(|| PrismError::not_found(path))?;
        }
        Ok(node)
    }

    pub fn contains(&self, path: &TaskPath) -> bool {
        !path.is_root() && self.get(path).is_ok()
    }

    /// Children of `parent`; the root path yields the Phases.
    pub fn children(&self, parent: &TaskPath) -> Result<&[Node]> {
        if parent.is_root() {
            return Ok(&self.phases);
        }
        Ok(&self.get(parent)?.children)
    }

    fn children_mut(&mut self, parent: &TaskPath) -> Result<&mut Vec<Node>> {
        if parent.is_root() {
            return Ok(&mut self.phases);
        }
        Ok(&mut self.get_mut(parent)?.children)
    }

    /// Longest prefix of `path` that still resolves.
    pub fn surviving_prefix(&self, path: &TaskPath) -> TaskPath {
        (1..=path.len())
            .rev()
            .map(|len| path.prefix(len))
            .find(|p| self.get(p).is_ok())
            .unwrap_or_default()
    }

    /// Pre-order walk over every node with its path.
    pub fn walk(&self) -> Vec<(TaskPath, &Node)> {
        fn visit<'a>(nodes: &'a [Node], base: &TaskPath, out: &mut Vec<(TaskPath, &'a Node)>) {
            for node in nodes {
                let path = base.join(node.id.clone());
                out.push((path.clone(), node));
                visit(&node.children, &path, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.phases, &TaskPath::root(), &mut out);
        out
    }

    /// Paths of every node at `depth` (1 = Phases) in document order.
    pub fn paths_at_depth(&self, depth: usize) -> Vec<TaskPath> {
        self.walk()
            .into_iter()
            .filter(|(p, _)| p.len() == depth)
            .map(|(p, _)| p)
            .collect()
    }

    // ---------------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------------

    /// Insert `node` under `parent` at `position` (appended when `None`).
    /// Returns the new node's path.
    pub fn add_child(
        &mut self,
        parent: &TaskPath,
        node: Node,
        position: Option<usize>,
    ) -> Result<TaskPath> {
        let expected = expected_child_level(self, parent)?;
        if node.level != expected {
            return Err(PrismError::Validation(format!(
                "cannot add {} '{}' under {}: expected a {}",
                node.level,
                node.id,
                describe(parent),
                expected
            )));
        }
        let siblings = self.children_mut(parent)?;
        if siblings.iter().any(|s| s.id == node.id) {
            return Err(PrismError::Validation(format!(
                "duplicate identifier '{}' under {}",
                node.id,
                describe(parent)
            )));
        }
        let at = check_position(position, siblings.len())?;
        let path = parent.join(node.id.clone());
        siblings.insert(at, node);
        self.touch(parent);
        self.dirty = true;
        Ok(path)
    }

    /// Detach the node at `path` together with its descendants.
    pub fn remove(&mut self, path: &TaskPath) -> Result<Node> {
        let parent = path
            .parent()
            .ok_or_else(|| PrismError::validation("cannot remove the project root"))?;
        let id = path.last().unwrap_or_default().to_string();
        let siblings = self
            .children_mut(&parent)
            .map_err(|_| PrismError::not_found(path))?;
        let idx = siblings
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| PrismError::not_found(path))?;
        let removed = siblings.remove(idx);
        self.touch(&parent);
        self.dirty = true;
        Ok(removed)
    }

    /// Move the node at `path` under `new_parent` without deleting it.
    /// Returns the node's new path.
    pub fn reparent(
        &mut self,
        path: &TaskPath,
        new_parent: &TaskPath,
        position: Option<usize>,
    ) -> Result<TaskPath> {
        let node = self.get(path)?;
        if new_parent.starts_with(path) {
            return Err(PrismError::Validation(format!(
                "cannot move '{path}' into its own subtree '{new_parent}'"
            )));
        }
        let expected = expected_child_level(self, new_parent)?;
        if node.level != expected {
            return Err(PrismError::Validation(format!(
                "cannot move {} '{}' under {}: expected a {}",
                node.level,
                node.id,
                describe(new_parent),
                expected
            )));
        }
        let same_parent = path.parent().as_ref() == Some(new_parent);
        let siblings = self.children(new_parent)?;
        if !same_parent && siblings.iter().any(|s| s.id == node.id) {
            return Err(PrismError::Validation(format!(
                "duplicate identifier '{}' under {}",
                node.id,
                describe(new_parent)
            )));
        }
        let max = if same_parent {
            siblings.len() - 1
        } else {
            siblings.len()
        };
        let at = check_position(position, max)?;

        let node = self.remove(path)?;
        let new_path = new_parent.join(node.id.clone());
        self.children_mut(new_parent)?.insert(at, node);
        self.touch(new_parent);
        Ok(new_path)
    }

    /// Move the node at `path` to `index` among its siblings.
    pub fn reorder(&mut self, path: &TaskPath, index: usize) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| PrismError::validation("cannot reorder the project root"))?;
        let id = path.last().unwrap_or_default().to_string();
        let siblings = self
            .children_mut(&parent)
            .map_err(|_| PrismError::not_found(path))?;
        let from = siblings
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| PrismError::not_found(path))?;
        if index >= siblings.len() {
            return Err(PrismError::Validation(format!(
                "position {index} is out of bounds ({} siblings)",
                siblings.len()
            )));
        }
        let node = siblings.remove(from);
        siblings.insert(index, node);
        self.touch(&parent);
        self.dirty = true;
        Ok(())
    }

    /// Set the status of a leaf Task or Subtask. Ancestors are not touched;
    /// run the status engine afterwards.
    pub fn set_status(&mut self, path: &TaskPath, status: Status) -> Result<()> {
        let node = self.get_mut(path)?;
        if !node.status_is_direct() {
            let why = if node.level.accepts_direct_status() {
                "it has subtasks"
            } else {
                "it is a container"
            };
            return Err(PrismError::Validation(format!(
                "status of {} '{path}' is derived from its children ({why})",
                node.level
            )));
        }
        if node.apply_status(status, Utc::now()) {
            self.dirty = true;
        }
        Ok(())
    }

    pub(crate) fn touch(&mut self, path: &TaskPath) {
        if let Ok(node) = self.get_mut(path) {
            node.updated_at = Utc::now();
        }
    }

    /// Structural validation of a tree read from disk.
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        model::check_siblings(&self.phases, Level::Phase)
    }
}

fn expected_child_level(tree: &Tree, parent: &TaskPath) -> Result<Level> {
    if parent.is_root() {
        return Ok(Level::Phase);
    }
    let node = tree.get(parent)?;
    node.level.child().ok_or_else(|| {
        PrismError::Validation(format!("{} '{parent}' cannot have children", node.level))
    })
}

fn check_position(position: Option<usize>, len: usize) -> Result<usize> {
    match position {
        None => Ok(len),
        Some(p) if p <= len => Ok(p),
        Some(p) => Err(PrismError::Validation(format!(
            "position {p} is out of bounds (0..={len})"
        ))),
    }
}

fn describe(parent: &TaskPath) -> String {
    if parent.is_root() {
        "the project root".to_string()
    } else {
        format!("'{parent}'")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> TaskPath {
        TaskPath::parse(s).unwrap()
    }

    fn sample() -> Tree {
        let mut tree = Tree::new();
        tree.add_child(&TaskPath::root(), Node::phase("alpha", "Alpha").unwrap(), None)
            .unwrap();
        tree.add_child(&p("alpha"), Node::milestone("0.1.x", "").unwrap(), None)
            .unwrap();
        tree.add_child(&p("alpha/0.1.x"), Node::block("0.1.1", "").unwrap(), None)
            .unwrap();
        tree.add_child(&p("alpha/0.1.x/0.1.1"), Node::task("data-model", "").unwrap(), None)
            .unwrap();
        tree.add_child(
            &p("alpha/0.1.x/0.1.1/data-model"),
            Node::subtask("schema", "").unwrap(),
            None,
        )
        .unwrap();
        tree.mark_clean();
        tree
    }

    #[test]
    fn add_and_get() {
        let tree = sample();
        let node = tree.get(&p("alpha/0.1.x/0.1.1/data-model/schema")).unwrap();
        assert_eq!(node.level, Level::Subtask);
        assert_eq!(tree.walk().len(), 5);
    }

    #[test]
    fn add_marks_dirty() {
        let mut tree = sample();
        assert!(!tree.is_dirty());
        tree.add_child(&p("alpha"), Node::milestone("0.2.x", "").unwrap(), None)
            .unwrap();
        assert!(tree.is_dirty());
    }

    #[test]
    fn add_rejects_wrong_level() {
        let mut tree = sample();
        let err = tree
            .add_child(&p("alpha"), Node::task("t", "").unwrap(), None)
            .unwrap_err();
        assert!(matches!(err, PrismError::Validation(_)));
    }

    #[test]
    fn add_rejects_duplicate_and_bad_position() {
        let mut tree = sample();
        assert!(matches!(
            tree.add_child(&p("alpha"), Node::milestone("0.1.x", "").unwrap(), None),
            Err(PrismError::Validation(_))
        ));
        assert!(matches!(
            tree.add_child(&p("alpha"), Node::milestone("0.2.x", "").unwrap(), Some(5)),
            Err(PrismError::Validation(_))
        ));
    }

    #[test]
    fn add_under_missing_parent() {
        let mut tree = sample();
        assert!(matches!(
            tree.add_child(&p("beta"), Node::milestone("0.1.x", "").unwrap(), None),
            Err(PrismError::NotFound(_))
        ));
    }

    #[test]
    fn add_at_position() {
        let mut tree = sample();
        tree.add_child(&p("alpha"), Node::milestone("0.0.x", "").unwrap(), Some(0))
            .unwrap();
        let ids: Vec<_> = tree
            .children(&p("alpha"))
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["0.0.x", "0.1.x"]);
    }

    #[test]
    fn remove_cascades() {
        let mut tree = sample();
        let removed = tree.remove(&p("alpha/0.1.x/0.1.1")).unwrap();
        assert_eq!(removed.subtree_len(), 3);
        assert!(!tree.contains(&p("alpha/0.1.x/0.1.1/data-model")));
        assert!(tree.contains(&p("alpha/0.1.x")));
    }

    #[test]
    fn reparent_moves_subtree() {
        let mut tree = sample();
        tree.add_child(&p("alpha/0.1.x"), Node::block("0.1.2", "").unwrap(), None)
            .unwrap();
        let new_path = tree
            .reparent(&p("alpha/0.1.x/0.1.1/data-model"), &p("alpha/0.1.x/0.1.2"), None)
            .unwrap();
        assert_eq!(new_path, p("alpha/0.1.x/0.1.2/data-model"));
        assert!(tree.contains(&p("alpha/0.1.x/0.1.2/data-model/schema")));
        assert!(tree.children(&p("alpha/0.1.x/0.1.1")).unwrap().is_empty());
    }

    #[test]
    fn reparent_rejects_cycle_and_level() {
        let mut tree = sample();
        assert!(matches!(
            tree.reparent(&p("alpha/0.1.x"), &p("alpha/0.1.x/0.1.1"), None),
            Err(PrismError::Validation(_))
        ));
        assert!(matches!(
            tree.reparent(&p("alpha/0.1.x/0.1.1/data-model"), &p("alpha"), None),
            Err(PrismError::Validation(_))
        ));
    }

    #[test]
    fn reorder_siblings() {
        let mut tree = sample();
        tree.add_child(&p("alpha/0.1.x"), Node::block("0.1.2", "").unwrap(), None)
            .unwrap();
        tree.reorder(&p("alpha/0.1.x/0.1.2"), 0).unwrap();
        let ids: Vec<_> = tree
            .children(&p("alpha/0.1.x"))
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(ids, vec!["0.1.2", "0.1.1"]);
        assert!(tree.reorder(&p("alpha/0.1.x/0.1.2"), 2).is_err());
    }

    #[test]
    fn set_status_only_on_leaves() {
        let mut tree = sample();
        tree.set_status(&p("alpha/0.1.x/0.1.1/data-model/schema"), Status::Completed)
            .unwrap();
        assert!(matches!(
            tree.set_status(&p("alpha/0.1.x/0.1.1/data-model"), Status::Completed),
            Err(PrismError::Validation(_))
        ));
        assert!(matches!(
            tree.set_status(&p("alpha/0.1.x"), Status::Completed),
            Err(PrismError::Validation(_))
        ));
    }

    #[test]
    fn surviving_prefix_after_removal() {
        let mut tree = sample();
        let deep = p("alpha/0.1.x/0.1.1/data-model/schema");
        tree.remove(&p("alpha/0.1.x/0.1.1")).unwrap();
        assert_eq!(tree.surviving_prefix(&deep), p("alpha/0.1.x"));
    }
}
