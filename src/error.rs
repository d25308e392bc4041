//! Error types for taskq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The queue has been asked to stop and no longer accepts work.
    #[error("queue is stopping; submission rejected")]
    Stopped,

    /// The control loop has terminated.
    #[error("queue is closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
