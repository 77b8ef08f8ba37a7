//! The in-memory session: hierarchy, timer, cursor and time log.
//!
//! Every mutating operation runs against a scratch copy and replaces the
//! session only when it succeeds, so a failed call leaves nothing half
//! applied. After each structural or status change the status engine
//! recomputes the affected ancestors and the cursor is re-resolved.

use crate::config::Config;
use crate::cursor::Cursor;
use crate::error::{PrismError, Result};
use crate::model::{Node, NodePatch};
use crate::status::{self, TieBreak};
use crate::task_path::TaskPath;
use crate::timer::{Clock, StartPolicy, SystemClock, TimeEntry, Timer};
use crate::tree::Tree;
use crate::types::{Level, Status};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Behavior knobs taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policies {
    pub tie_break: TieBreak,
    pub start_policy: StartPolicy,
    pub history_keep: usize,
}

impl Default for Policies {
    fn default() -> Self {
        Policies::from(&Config::default())
    }
}

impl From<&Config> for Policies {
    fn from(cfg: &Config) -> Self {
        Self {
            tie_break: cfg.status.tie_break,
            start_policy: cfg.timer.on_start_while_running,
            history_keep: cfg.history.keep,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    tree: Tree,
    timer: Timer,
    cursor: Cursor,
    history: Vec<TimeEntry>,
    policies: Policies,
    clock: Arc<dyn Clock>,
    dirty: bool,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: Tree::new(),
            timer: Timer::Idle,
            cursor: Cursor::empty(),
            history: Vec::new(),
            policies: Policies::default(),
            clock: Arc::new(SystemClock),
            dirty: true,
        }
    }

    pub fn with_policies(mut self, policies: Policies) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn from_parts(
        name: String,
        tree: Tree,
        timer: Timer,
        cursor: Cursor,
        history: Vec<TimeEntry>,
        policies: Policies,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            tree,
            timer,
            cursor,
            history,
            policies,
            clock,
            dirty: false,
        }
    }

    // ---------------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Finished timer sessions and logged time, oldest first.
    pub fn history(&self) -> &[TimeEntry] {
        &self.history
    }

    pub fn policies(&self) -> Policies {
        self.policies
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Whether anything changed since the last save or load.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.tree.is_dirty()
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
        self.tree.mark_clean();
    }

    pub fn get(&self, path: &TaskPath) -> Result<&Node> {
        self.tree.get(path)
    }

    /// Elapsed time of the active timer session, if any.
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed(self.clock.as_ref())
    }

    /// Recorded time of the node at `path` and all its descendants. The root
    /// path sums the whole project.
    pub fn time_spent(&self, path: &TaskPath) -> Result<Duration> {
        if path.is_root() {
            return Ok(self.tree.phases().iter().map(Node::total_time).sum());
        }
        Ok(self.tree.get(path)?.total_time())
    }

    fn transact<T>(&mut self, op: impl FnOnce(&mut Project) -> Result<T>) -> Result<T> {
        let mut scratch = self.clone();
        let out = op(&mut scratch)?;
        scratch.dirty = true;
        *self = scratch;
        Ok(out)
    }

    // ---------------------------------------------------------------------------
    // Structure
    // ---------------------------------------------------------------------------

    /// Add `node` under `parent` (the root path adds a Phase). The first
    /// entity of an empty project becomes the cursor position.
    pub fn add(
        &mut self,
        parent: &TaskPath,
        node: Node,
        position: Option<usize>,
    ) -> Result<TaskPath> {
        self.transact(|p| {
            let path = p.tree.add_child(parent, node, position)?;
            status::recompute(&mut p.tree, &path, p.policies.tie_break);
            if p.cursor.is_empty() {
                p.cursor.set(&p.tree, path.clone())?;
            }
            Ok(path)
        })
    }

    /// Delete the node at `path` and its descendants.
    pub fn remove(&mut self, path: &TaskPath) -> Result<Node> {
        self.transact(|p| {
            let removed = p.tree.remove(path)?;
            if let Some(subtask) = p.timer.discard_under(path) {
                tracing::warn!(
                    subtask = %subtask,
                    "timed subtask was deleted; its unrecorded session was discarded"
                );
            }
            if let Some(parent) = path.parent() {
                status::recompute(&mut p.tree, &parent, p.policies.tie_break);
            }
            p.cursor.revalidate(&p.tree);
            Ok(removed)
        })
    }

    /// Reparent the node at `path` under `new_parent`. Timer and cursor
    /// follow the moved subtree.
    pub fn move_node(
        &mut self,
        path: &TaskPath,
        new_parent: &TaskPath,
        position: Option<usize>,
    ) -> Result<TaskPath> {
        self.transact(|p| {
            let new_path = p.tree.reparent(path, new_parent, position)?;
            p.timer.rebase(path, &new_path);
            p.cursor.rebase(path, &new_path);
            let tie = p.policies.tie_break;
            if let Some(old_parent) = path.parent() {
                status::recompute(&mut p.tree, &old_parent, tie);
            }
            status::recompute(&mut p.tree, &new_path, tie);
            p.cursor.revalidate(&p.tree);
            Ok(new_path)
        })
    }

    pub fn reorder(&mut self, path: &TaskPath, index: usize) -> Result<()> {
        self.transact(|p| p.tree.reorder(path, index))
    }

    /// Set the status of a leaf Task or Subtask and propagate upward.
    pub fn set_status(&mut self, path: &TaskPath, status: Status) -> Result<()> {
        self.transact(|p| {
            p.tree.set_status(path, status)?;
            status::recompute(&mut p.tree, path, p.policies.tie_break);
            Ok(())
        })
    }

    pub fn edit(&mut self, path: &TaskPath, patch: NodePatch) -> Result<()> {
        self.transact(|p| {
            let node = p.tree.get_mut(path)?;
            patch.apply(node, Utc::now())?;
            p.tree.mark_dirty();
            Ok(())
        })
    }

    // ---------------------------------------------------------------------------
    // Timer
    // ---------------------------------------------------------------------------

    /// Start timing the Subtask at `path`. Returns the session that was
    /// auto-stopped to make room, if any; its time is already recorded.
    pub fn start(&mut self, path: &TaskPath) -> Result<Option<TimeEntry>> {
        self.transact(|p| {
            let node = p.tree.get(path)?;
            if node.level != Level::Subtask {
                return Err(PrismError::Validation(format!(
                    "timers attach to subtasks only; '{path}' is a {}",
                    node.level
                )));
            }
            let previous = p
                .timer
                .start(path.clone(), p.policies.start_policy, p.clock.as_ref())?;
            if let Some(entry) = &previous {
                p.record(entry.clone());
            }
            Ok(previous)
        })
    }

    /// Returns the session's accumulated time.
    pub fn pause(&mut self) -> Result<Duration> {
        self.transact(|p| p.timer.pause(p.clock.as_ref()))
    }

    pub fn resume(&mut self) -> Result<()> {
        self.transact(|p| p.timer.resume(p.clock.as_ref()))
    }

    /// Attach a note on what the active session is spent on.
    pub fn describe(&mut self, text: Option<String>) -> Result<()> {
        self.transact(|p| p.timer.describe(text))
    }

    /// Finish the session and add its time to the Subtask's total.
    pub fn stop(&mut self) -> Result<TimeEntry> {
        self.transact(|p| {
            let entry = p.timer.stop(p.clock.as_ref())?;
            p.record(entry.clone());
            Ok(entry)
        })
    }

    /// Add time directly to a Subtask or a Task without Subtasks. Returns the
    /// node's new own total.
    pub fn log_time(
        &mut self,
        path: &TaskPath,
        duration: Duration,
        description: Option<String>,
    ) -> Result<Duration> {
        if duration.is_zero() {
            return Err(PrismError::validation("logged time must be greater than zero"));
        }
        self.transact(|p| {
            let node = p.tree.get_mut(path)?;
            if !node.status_is_direct() {
                return Err(PrismError::Validation(format!(
                    "time can only be logged on a subtask or a task without subtasks; \
                     '{path}' is a {} with children",
                    node.level
                )));
            }
            let now = p.clock.wall();
            node.time_spent += duration;
            node.updated_at = now;
            let total = node.time_spent;
            p.tree.mark_dirty();
            let started_at = now - chrono::Duration::from_std(duration).unwrap_or_default();
            p.push_history(TimeEntry {
                target: path.clone(),
                started_at,
                ended_at: now,
                duration,
                description: description.filter(|d| !d.trim().is_empty()),
            });
            Ok(total)
        })
    }

    fn record(&mut self, entry: TimeEntry) {
        let mut found = false;
        if let Ok(node) = self.tree.get_mut(&entry.target) {
            node.time_spent += entry.duration;
            node.updated_at = entry.ended_at;
            found = true;
        }
        if found {
            self.tree.mark_dirty();
        } else {
            tracing::warn!(
                subtask = %entry.target,
                "timed subtask no longer exists; session kept in the time log only"
            );
        }
        self.push_history(entry);
    }

    fn push_history(&mut self, entry: TimeEntry) {
        let keep = self.policies.history_keep;
        if keep == 0 {
            return;
        }
        self.history.push(entry);
        let excess = self.history.len().saturating_sub(keep);
        self.history.drain(..excess);
    }

    // ---------------------------------------------------------------------------
    // Cursor
    // ---------------------------------------------------------------------------

    pub fn set_cursor(&mut self, path: TaskPath) -> Result<&TaskPath> {
        self.cursor.set(&self.tree, path)?;
        self.dirty = true;
        Ok(self.cursor.path())
    }

    pub fn next(&mut self) -> Result<&TaskPath> {
        self.cursor.next(&self.tree)?;
        self.dirty = true;
        Ok(self.cursor.path())
    }

    pub fn previous(&mut self) -> Result<&TaskPath> {
        self.cursor.previous(&self.tree)?;
        self.dirty = true;
        Ok(self.cursor.path())
    }

    pub fn enter(&mut self) -> Result<&TaskPath> {
        self.cursor.enter(&self.tree)?;
        self.dirty = true;
        Ok(self.cursor.path())
    }

    pub fn leave(&mut self) -> Result<&TaskPath> {
        self.cursor.leave(&self.tree)?;
        self.dirty = true;
        Ok(self.cursor.path())
    }

    /// Re-resolve the cursor and recompute every derived status. Used after
    /// loading a document from disk.
    pub(crate) fn normalize(&mut self) {
        if self.cursor.revalidate(&self.tree) {
            tracing::debug!(cursor = %self.cursor.path(), "cursor re-resolved on load");
            self.dirty = true;
        }
        let changed = status::recompute_all(&mut self.tree, self.policies.tie_break);
        if changed > 0 {
            tracing::debug!(changed, "derived statuses corrected on load");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{ManualClock, TimerState};

    fn p(s: &str) -> TaskPath {
        TaskPath::parse(s).unwrap()
    }

    fn project() -> (Project, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let mut prj = Project::new("demo").with_clock(clock.clone());
        prj.add(&TaskPath::root(), Node::phase("alpha", "").unwrap(), None)
            .unwrap();
        prj.add(&p("alpha"), Node::milestone("0.1.x", "").unwrap(), None)
            .unwrap();
        prj.add(&p("alpha/0.1.x"), Node::block("0.1.1", "").unwrap(), None)
            .unwrap();
        prj.add(
            &p("alpha/0.1.x/0.1.1"),
            Node::task("data-model", "").unwrap(),
            None,
        )
        .unwrap();
        for s in ["schema", "loader"] {
            prj.add(
                &p("alpha/0.1.x/0.1.1/data-model"),
                Node::subtask(s, "").unwrap(),
                None,
            )
            .unwrap();
        }
        (prj, clock)
    }

    #[test]
    fn first_add_sets_cursor() {
        let (prj, _) = project();
        assert_eq!(prj.cursor().path(), &p("alpha"));
    }

    #[test]
    fn failed_mutation_changes_nothing() {
        let (mut prj, _) = project();
        let before = prj.tree().clone();
        let err = prj
            .add(&p("alpha/0.1.x"), Node::task("wrong-tier", "").unwrap(), None)
            .unwrap_err();
        assert!(matches!(err, PrismError::Validation(_)));
        assert_eq!(prj.tree(), &before);
    }

    #[test]
    fn set_status_propagates() {
        let (mut prj, _) = project();
        let task = p("alpha/0.1.x/0.1.1/data-model");
        prj.set_status(&task.join("schema"), Status::Completed).unwrap();
        assert_eq!(prj.get(&task).unwrap().status, Status::InProgress);
        prj.set_status(&task.join("loader"), Status::Completed).unwrap();
        assert_eq!(prj.get(&p("alpha")).unwrap().status, Status::Completed);
        assert!(matches!(
            prj.set_status(&task, Status::Pending),
            Err(PrismError::Validation(_))
        ));
    }

    #[test]
    fn start_requires_subtask() {
        let (mut prj, _) = project();
        let err = prj.start(&p("alpha/0.1.x/0.1.1/data-model")).unwrap_err();
        assert!(matches!(err, PrismError::Validation(_)));
        assert_eq!(prj.timer().state(), TimerState::Idle);
    }

    #[test]
    fn stop_records_time_and_history() {
        let (mut prj, clock) = project();
        let schema = p("alpha/0.1.x/0.1.1/data-model/schema");
        prj.start(&schema).unwrap();
        clock.advance(Duration::from_secs(30));
        prj.pause().unwrap();
        clock.advance(Duration::from_secs(600));
        prj.resume().unwrap();
        clock.advance(Duration::from_secs(15));
        let entry = prj.stop().unwrap();
        assert_eq!(entry.duration, Duration::from_secs(45));
        assert_eq!(prj.get(&schema).unwrap().time_spent, Duration::from_secs(45));
        assert_eq!(prj.history().len(), 1);
        assert_eq!(
            prj.time_spent(&p("alpha")).unwrap(),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn history_is_bounded() {
        let (prj, clock) = project();
        let mut prj = prj.with_policies(Policies {
            history_keep: 2,
            ..Policies::default()
        });
        let schema = p("alpha/0.1.x/0.1.1/data-model/schema");
        for secs in [1, 2, 3] {
            prj.start(&schema).unwrap();
            clock.advance(Duration::from_secs(secs));
            prj.stop().unwrap();
        }
        let kept: Vec<u64> = prj.history().iter().map(|e| e.duration.as_secs()).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn log_time_on_leaves_only() {
        let (mut prj, _) = project();
        let task = p("alpha/0.1.x/0.1.1/data-model");
        assert!(prj.log_time(&task, Duration::from_secs(60), None).is_err());
        let total = prj
            .log_time(&task.join("loader"), Duration::from_secs(60), Some("wiring".into()))
            .unwrap();
        assert_eq!(total, Duration::from_secs(60));
        assert!(prj.log_time(&task.join("loader"), Duration::ZERO, None).is_err());
        assert_eq!(prj.history().len(), 1);
        assert_eq!(prj.history()[0].description.as_deref(), Some("wiring"));
    }

    #[test]
    fn session_note_reaches_time_log() {
        let (mut prj, clock) = project();
        assert!(matches!(
            prj.describe(Some("idle".into())),
            Err(PrismError::Validation(_))
        ));
        prj.start(&p("alpha/0.1.x/0.1.1/data-model/schema")).unwrap();
        prj.describe(Some("column types".into())).unwrap();
        clock.advance(Duration::from_secs(10));
        let entry = prj.stop().unwrap();
        assert_eq!(entry.description.as_deref(), Some("column types"));
        assert_eq!(prj.history()[0], entry);
    }

    #[test]
    fn remove_resets_timer_and_cursor() {
        let (mut prj, _) = project();
        let task = p("alpha/0.1.x/0.1.1/data-model");
        prj.start(&task.join("schema")).unwrap();
        prj.set_cursor(task.join("schema")).unwrap();
        prj.remove(&task).unwrap();
        assert_eq!(prj.timer().state(), TimerState::Idle);
        assert_eq!(prj.cursor().path(), &p("alpha/0.1.x/0.1.1"));
        assert!(prj.get(&task.join("schema")).is_err());
    }

    #[test]
    fn removing_last_child_resets_container() {
        let (mut prj, _) = project();
        let block = p("alpha/0.1.x/0.1.1");
        let task = block.join("data-model");
        prj.set_status(&task.join("schema"), Status::Blocked).unwrap();
        assert_eq!(prj.get(&block).unwrap().status, Status::Blocked);

        prj.remove(&task).unwrap();
        assert_eq!(prj.get(&block).unwrap().status, Status::Pending);
        assert_eq!(prj.get(&p("alpha")).unwrap().status, Status::Pending);
    }

    #[test]
    fn move_rebases_timer_and_cursor() {
        let (mut prj, _) = project();
        prj.add(&p("alpha/0.1.x"), Node::block("0.1.2", "").unwrap(), None)
            .unwrap();
        let task = p("alpha/0.1.x/0.1.1/data-model");
        prj.start(&task.join("schema")).unwrap();
        prj.set_cursor(task.join("loader")).unwrap();
        let moved = prj.move_node(&task, &p("alpha/0.1.x/0.1.2"), None).unwrap();
        assert_eq!(moved, p("alpha/0.1.x/0.1.2/data-model"));
        assert_eq!(prj.timer().target(), Some(&moved.join("schema")));
        assert_eq!(prj.cursor().path(), &moved.join("loader"));
    }

    #[test]
    fn edit_updates_descriptive_fields() {
        let (mut prj, _) = project();
        let task = p("alpha/0.1.x/0.1.1/data-model");
        prj.edit(
            &task,
            NodePatch {
                label: Some("Data model".into()),
                reason: Some("everything reads it".into()),
                tags: Some(vec!["Core".into()]),
            },
        )
        .unwrap();
        let node = prj.get(&task).unwrap();
        assert_eq!(node.label, "Data model");
        assert_eq!(node.reason.as_deref(), Some("everything reads it"));
        assert_eq!(node.tags, vec!["core"]);
    }

    #[test]
    fn navigation_marks_dirty() {
        let (mut prj, _) = project();
        prj.mark_clean();
        assert!(!prj.is_dirty());
        prj.enter().unwrap();
        assert!(prj.is_dirty());
        assert_eq!(prj.cursor().path(), &p("alpha/0.1.x"));
    }
}
