//! Core data model.
//!
//! Identifiers, the concurrency limit, the queue's lifecycle state and the
//! statistics snapshot the control loop publishes after every event.

use serde::{Deserialize, Serialize};
use std::num::NonZero;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Newtype for queue instance IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueId(pub Uuid);

impl QueueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequence number assigned to an item when the control loop accepts it.
///
/// Numbering starts at 1 and is strictly increasing within one queue, so it
/// also records acceptance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Concurrency limit
// ---------------------------------------------------------------------------

/// How many workers a queue may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyLimit {
    /// Every queued item is admitted immediately.
    #[default]
    Unlimited,

    /// At most this many items run at once.
    Max(NonZero<usize>),
}

impl ConcurrencyLimit {
    /// Would one more worker fit, given `in_flight` already running?
    pub fn admits(self, in_flight: usize) -> bool {
        match self {
            ConcurrencyLimit::Unlimited => true,
            ConcurrencyLimit::Max(max) => in_flight < max.get(),
        }
    }

    /// The numeric limit, `None` when unlimited.
    pub fn get(self) -> Option<usize> {
        match self {
            ConcurrencyLimit::Unlimited => None,
            ConcurrencyLimit::Max(max) => Some(max.get()),
        }
    }
}

/// `0` means unlimited.
impl From<usize> for ConcurrencyLimit {
    fn from(value: usize) -> Self {
        NonZero::new(value)
            .map(ConcurrencyLimit::Max)
            .unwrap_or(ConcurrencyLimit::Unlimited)
    }
}

impl std::fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyLimit::Unlimited => write!(f, "unlimited"),
            ConcurrencyLimit::Max(max) => write!(f, "{max}"),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a queue. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Accepting submissions and admitting work.
    Running,
    /// Stop requested. Rejects submissions, still admits the backlog.
    Stopping,
    /// Control loop has exited. Terminal.
    Terminated,
}

impl QueueState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: QueueState) -> bool {
        use QueueState::*;
        matches!((self, to), (Running, Stopping) | (Stopping, Terminated))
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueState::Terminated)
    }

    pub fn accepts_submissions(self) -> bool {
        matches!(self, QueueState::Running)
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueState::Running => "running",
            QueueState::Stopping => "stopping",
            QueueState::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Stop mode
// ---------------------------------------------------------------------------

/// What a stop request does with work that has not been admitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// Keep admitting until the backlog is empty.
    #[default]
    Drain,
    /// Drop the backlog. Items already running still finish.
    Discard,
}

impl std::str::FromStr for StopMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drain" => Ok(StopMode::Drain),
            "discard" => Ok(StopMode::Discard),
            other => Err(crate::error::Error::Config(format!(
                "unknown stop mode '{other}' (expected drain or discard)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a single worker ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    /// The handler panicked.
    Panicked { message: String },
    /// The worker was torn down by the runtime before finishing.
    Aborted,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    /// Short label used for metrics and span transitions.
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Panicked { .. } => "panicked",
            TaskOutcome::Aborted => "aborted",
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time view of a queue, published by the control loop after it
/// finishes handling each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub state: QueueState,

    /// Accepted items not yet admitted.
    pub backlog: usize,

    /// Workers currently running.
    pub in_flight: usize,

    /// Highest `in_flight` seen over the queue's life.
    pub peak_in_flight: usize,

    /// Items accepted into the backlog.
    pub submitted: u64,

    /// Items popped from the backlog and handed to a worker.
    pub admitted: u64,

    /// Workers that ran their handler to completion.
    pub completed: u64,

    /// Workers whose handler panicked or was aborted.
    pub failed: u64,

    /// Submissions refused because the queue was stopping.
    pub rejected: u64,

    /// Backlog items dropped by a discarding stop.
    pub discarded: u64,

    /// Every task with an id up to and including this one has finished or
    /// been discarded.
    pub settled: u64,
}

impl QueueStats {
    /// Items submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.backlog + self.in_flight
    }
}

impl Default for QueueStats {
    fn default() -> Self {
        Self {
            state: QueueState::Running,
            backlog: 0,
            in_flight: 0,
            peak_in_flight: 0,
            submitted: 0,
            admitted: 0,
            completed: 0,
            failed: 0,
            rejected: 0,
            discarded: 0,
            settled: 0,
        }
    }
}
