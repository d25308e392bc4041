//! # taskq
//!
//! In-memory, bounded-concurrency work queue for Tokio.
//!
//! A [`WorkQueue`] accepts any number of items, runs them through one shared
//! handler, never runs more than a configured number at once, and drains
//! outstanding work on a graceful stop. The [`sim`] module drives queues with
//! simulated latencies (tied requests, hedged requests) and the `taskq` binary
//! exposes those simulations on the command line.

pub mod config;
pub mod error;
pub mod model;
pub mod queue;
pub mod sim;
pub mod telemetry;

pub use error::{Error, Result};
pub use model::{
    ConcurrencyLimit, QueueId, QueueState, QueueStats, StopMode, TaskId, TaskOutcome,
};
pub use queue::{QueueConfig, WorkQueue};
