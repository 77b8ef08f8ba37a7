//! Work timer: a single state machine per project.
//!
//! The runtime [`Timer`] measures in-session time with a monotonic clock.
//! On disk it becomes a [`TimerSnapshot`] that stores durations and wall-clock
//! anchors only, so totals stay meaningful across process restarts.

use crate::error::{PrismError, Result};
use crate::task_path::TaskPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source: `now` is monotonic, `wall` is for persisted anchors.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> Instant;
    fn wall(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Both readings advance together.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    wall_base: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            wall_base: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset()
    }

    fn wall(&self) -> DateTime<Utc> {
        self.wall_base + chrono::Duration::from_std(self.offset()).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What `start` does when a different Subtask's timer is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Stop the running timer, recording its time, then start the new one.
    #[default]
    AutoStop,
    /// Refuse with a conflict error.
    Reject,
}

// ---------------------------------------------------------------------------
// TimeEntry
// ---------------------------------------------------------------------------

/// One finished timer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub target: TaskPath,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration: Duration,
    /// What the time was spent on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
}

impl TimerState {
    pub fn as_str(self) -> &'static str {
        match self {
            TimerState::Idle => "idle",
            TimerState::Running => "running",
            TimerState::Paused => "paused",
        }
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Timer {
    #[default]
    Idle,
    Running {
        target: TaskPath,
        session_started: DateTime<Utc>,
        since: Instant,
        accumulated: Duration,
        description: Option<String>,
    },
    Paused {
        target: TaskPath,
        session_started: DateTime<Utc>,
        accumulated: Duration,
        description: Option<String>,
    },
}

impl Timer {
    pub fn state(&self) -> TimerState {
        match self {
            Timer::Idle => TimerState::Idle,
            Timer::Running { .. } => TimerState::Running,
            Timer::Paused { .. } => TimerState::Paused,
        }
    }

    pub fn target(&self) -> Option<&TaskPath> {
        match self {
            Timer::Idle => None,
            Timer::Running { target, .. } | Timer::Paused { target, .. } => Some(target),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Timer::Idle => None,
            Timer::Running { description, .. } | Timer::Paused { description, .. } => {
                description.as_deref()
            }
        }
    }

    /// Replace the note on the active session. Blank text clears it.
    pub fn describe(&mut self, text: Option<String>) -> Result<()> {
        match self {
            Timer::Idle => Err(PrismError::Validation(
                "no timer session to describe".into(),
            )),
            Timer::Running { description, .. } | Timer::Paused { description, .. } => {
                *description = text.filter(|t| !t.trim().is_empty());
                Ok(())
            }
        }
    }

    /// Time accumulated in the current session so far.
    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        match self {
            Timer::Idle => Duration::ZERO,
            Timer::Running {
                since, accumulated, ..
            } => *accumulated + clock.now().saturating_duration_since(*since),
            Timer::Paused { accumulated, .. } => *accumulated,
        }
    }

    /// Begin timing `target`. A paused session on the same target resumes; a
    /// session on another target is stopped first (subject to `policy`) and
    /// returned so the caller can record it.
    pub fn start(
        &mut self,
        target: TaskPath,
        policy: StartPolicy,
        clock: &dyn Clock,
    ) -> Result<Option<TimeEntry>> {
        let same_target = self.target() == Some(&target);
        match (self.state(), same_target) {
            (TimerState::Running, true) => {
                return Err(PrismError::Conflict(format!(
                    "timer is already running on '{target}'"
                )));
            }
            (TimerState::Running, false) if policy == StartPolicy::Reject => {
                let current = self.target().cloned().unwrap_or_default();
                return Err(PrismError::Conflict(format!(
                    "timer is already running on '{current}'; stop it before starting '{target}'"
                )));
            }
            (TimerState::Paused, true) => {
                self.resume(clock)?;
                return Ok(None);
            }
            _ => {}
        }
        let previous = match self.state() {
            TimerState::Idle => None,
            _ => Some(self.stop(clock)?),
        };
        *self = Timer::Running {
            target,
            session_started: clock.wall(),
            since: clock.now(),
            accumulated: Duration::ZERO,
            description: None,
        };
        Ok(previous)
    }

    /// Running → paused, banking the time since the last start/resume.
    pub fn pause(&mut self, clock: &dyn Clock) -> Result<Duration> {
        match std::mem::take(self) {
            Timer::Running {
                target,
                session_started,
                since,
                accumulated,
                description,
            } => {
                let total = accumulated + clock.now().saturating_duration_since(since);
                *self = Timer::Paused {
                    target,
                    session_started,
                    accumulated: total,
                    description,
                };
                Ok(total)
            }
            other => {
                let state = other.state();
                *self = other;
                Err(invalid(state, TimerState::Paused))
            }
        }
    }

    /// Paused → running on the same target.
    pub fn resume(&mut self, clock: &dyn Clock) -> Result<()> {
        match std::mem::take(self) {
            Timer::Paused {
                target,
                session_started,
                accumulated,
                description,
            } => {
                *self = Timer::Running {
                    target,
                    session_started,
                    since: clock.now(),
                    accumulated,
                    description,
                };
                Ok(())
            }
            other => {
                let state = other.state();
                *self = other;
                Err(invalid(state, TimerState::Running))
            }
        }
    }

    /// Running or paused → idle. The finished session is returned for the
    /// caller to add to the target's total.
    pub fn stop(&mut self, clock: &dyn Clock) -> Result<TimeEntry> {
        let duration = self.elapsed(clock);
        match std::mem::take(self) {
            Timer::Running {
                target,
                session_started,
                description,
                ..
            }
            | Timer::Paused {
                target,
                session_started,
                description,
                ..
            } => Ok(TimeEntry {
                target,
                started_at: session_started,
                ended_at: clock.wall(),
                duration,
                description,
            }),
            Timer::Idle => Err(invalid(TimerState::Idle, TimerState::Idle)),
        }
    }

    /// Follow a node that moved from `from` to `to`.
    pub(crate) fn rebase(&mut self, from: &TaskPath, to: &TaskPath) {
        if let Timer::Running { target, .. } | Timer::Paused { target, .. } = self {
            if let Some(moved) = target.rebase(from, to) {
                *target = moved;
            }
        }
    }

    /// Drop the session if its target lies inside the removed subtree.
    /// Returns the abandoned target.
    pub(crate) fn discard_under(&mut self, removed: &TaskPath) -> Option<TaskPath> {
        let hit = self.target().is_some_and(|t| t.starts_with(removed));
        if !hit {
            return None;
        }
        match std::mem::take(self) {
            Timer::Running { target, .. } | Timer::Paused { target, .. } => Some(target),
            Timer::Idle => None,
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Snapshot for disk. `released` marks a clean hand-off: the timer keeps
    /// running by wall clock until the next session picks it up.
    pub fn snapshot(&self, clock: &dyn Clock, released: bool) -> TimerSnapshot {
        match self {
            Timer::Idle => TimerSnapshot::Idle,
            Timer::Running {
                target,
                session_started,
                since,
                accumulated,
                description,
            } => {
                let wall = clock.wall();
                let running_for = clock.now().saturating_duration_since(*since);
                let resumed_at =
                    wall - chrono::Duration::from_std(running_for).unwrap_or_default();
                TimerSnapshot::Running {
                    target: target.clone(),
                    session_started: *session_started,
                    resumed_at,
                    checkpoint: wall,
                    accumulated: *accumulated,
                    released,
                    description: description.clone(),
                }
            }
            Timer::Paused {
                target,
                session_started,
                accumulated,
                description,
            } => TimerSnapshot::Paused {
                target: target.clone(),
                session_started: *session_started,
                accumulated: *accumulated,
                description: description.clone(),
            },
        }
    }

    /// Rebuild the runtime timer. A running snapshot that was not released
    /// comes from a session that died mid-flight: it is restored as paused
    /// with time counted up to its last checkpoint, and `interrupted` is set.
    pub fn restore(snapshot: &TimerSnapshot, clock: &dyn Clock) -> Restored {
        match snapshot {
            TimerSnapshot::Idle => Restored {
                timer: Timer::Idle,
                interrupted: false,
            },
            TimerSnapshot::Paused {
                target,
                session_started,
                accumulated,
                description,
            } => Restored {
                timer: Timer::Paused {
                    target: target.clone(),
                    session_started: *session_started,
                    accumulated: *accumulated,
                    description: description.clone(),
                },
                interrupted: false,
            },
            TimerSnapshot::Running {
                target,
                session_started,
                resumed_at,
                checkpoint: _,
                accumulated,
                released: true,
                description,
            } => {
                let away = wall_delta(*resumed_at, clock.wall());
                Restored {
                    timer: Timer::Running {
                        target: target.clone(),
                        session_started: *session_started,
                        since: clock.now(),
                        accumulated: *accumulated + away,
                        description: description.clone(),
                    },
                    interrupted: false,
                }
            }
            TimerSnapshot::Running {
                target,
                session_started,
                resumed_at,
                checkpoint,
                accumulated,
                released: false,
                description,
            } => Restored {
                timer: Timer::Paused {
                    target: target.clone(),
                    session_started: *session_started,
                    accumulated: *accumulated + wall_delta(*resumed_at, *checkpoint),
                    description: description.clone(),
                },
                interrupted: true,
            },
        }
    }
}

/// Result of [`Timer::restore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    pub timer: Timer,
    pub interrupted: bool,
}

fn wall_delta(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or_default()
}

fn invalid(from: TimerState, to: TimerState) -> PrismError {
    let reason = match (from, to) {
        (TimerState::Idle, _) => "no timer is active",
        (TimerState::Paused, TimerState::Paused) => "timer is already paused",
        (TimerState::Running, TimerState::Running) => "timer is already running",
        _ => "transition not allowed",
    };
    PrismError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TimerSnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimerSnapshot {
    #[default]
    Idle,
    Running {
        target: TaskPath,
        session_started: DateTime<Utc>,
        /// Wall time the current running stretch began.
        resumed_at: DateTime<Utc>,
        /// Last moment the writer knew the timer was still running.
        checkpoint: DateTime<Utc>,
        /// Time banked before `resumed_at`.
        accumulated: Duration,
        #[serde(default)]
        released: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Paused {
        target: TaskPath,
        session_started: DateTime<Utc>,
        accumulated: Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl TimerSnapshot {
    pub fn target(&self) -> Option<&TaskPath> {
        match self {
            TimerSnapshot::Idle => None,
            TimerSnapshot::Running { target, .. } | TimerSnapshot::Paused { target, .. } => {
                Some(target)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
