//! Bounded-concurrency work queue.
//!
//! [`WorkQueue`] is a cheap, cloneable handle. All queue state lives in a
//! single control loop task (see [`control`]); handles talk to it over a
//! command channel and read its published [`QueueStats`] from a watch channel.
//!
//! Dropping every handle closes the command channel. The control loop then
//! behaves as if [`WorkQueue::stop`] had been called: it drains the backlog,
//! waits for running workers and exits.

mod control;

use crate::error::{Error, Result};
use crate::model::{ConcurrencyLimit, QueueId, QueueStats, StopMode, TaskId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinError;
use tracing::Instrument;

use control::ControlLoop;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Construction parameters for a queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Human-readable name used in logs, spans and metric labels.
    pub name: String,
    pub concurrency_limit: ConcurrencyLimit,
}

impl QueueConfig {
    pub fn new(concurrency_limit: impl Into<ConcurrencyLimit>) -> Self {
        Self {
            name: "default".to_string(),
            concurrency_limit: concurrency_limit.into(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(ConcurrencyLimit::Unlimited)
    }
}

/// The work function shared by every worker of a queue.
pub(crate) enum Handler<T> {
    Async(Arc<dyn Fn(T) -> BoxFuture + Send + Sync>),
    Blocking(Arc<dyn Fn(T) + Send + Sync>),
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Handler::Async(f) => Handler::Async(Arc::clone(f)),
            Handler::Blocking(f) => Handler::Blocking(Arc::clone(f)),
        }
    }
}

impl<T: Send + 'static> Handler<T> {
    /// Run the handler for one item on its own task so a panic is contained
    /// and surfaces as a `JoinError` instead of unwinding the worker.
    pub(crate) async fn run(self, item: T) -> std::result::Result<(), JoinError> {
        match self {
            Handler::Async(f) => tokio::spawn(f(item).in_current_span()).await,
            Handler::Blocking(f) => {
                let span = tracing::Span::current();
                tokio::task::spawn_blocking(move || span.in_scope(|| f(item))).await
            }
        }
    }
}

/// Messages from handles to the control loop. Every command carries an
/// acknowledgement so callers return only once the loop has handled it.
pub(crate) enum Command<T> {
    Submit {
        item: T,
        ack: oneshot::Sender<Result<TaskId>>,
    },
    Stop {
        mode: StopMode,
        ack: oneshot::Sender<()>,
    },
}

/// Handle to a running queue.
pub struct WorkQueue<T> {
    id: QueueId,
    name: Arc<str>,
    concurrency_limit: ConcurrencyLimit,
    commands: mpsc::Sender<Command<T>>,
    stats: watch::Receiver<QueueStats>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            concurrency_limit: self.concurrency_limit,
            commands: self.commands.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("stats", &*self.stats.borrow())
            .finish()
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Create a queue with an async handler. `limit` of `0` means unlimited.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<F, Fut>(handler: F, limit: impl Into<ConcurrencyLimit>) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_config(QueueConfig::new(limit), handler)
    }

    /// Create a named queue with an async handler.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_config<F, Fut>(config: QueueConfig, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: Arc<dyn Fn(T) -> BoxFuture + Send + Sync> =
            Arc::new(move |item: T| -> BoxFuture { Box::pin(handler(item)) });
        Self::spawn(config, Handler::Async(boxed))
    }

    /// Create a queue whose handler blocks the calling thread (sleeps, does
    /// synchronous I/O, burns CPU). Each item runs on Tokio's blocking pool.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn blocking<F>(handler: F, limit: impl Into<ConcurrencyLimit>) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::blocking_with_config(QueueConfig::new(limit), handler)
    }

    /// Named variant of [`WorkQueue::blocking`].
    pub fn blocking_with_config<F>(config: QueueConfig, handler: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self::spawn(config, Handler::Blocking(Arc::new(handler)))
    }

    fn spawn(config: QueueConfig, handler: Handler<T>) -> Self {
        let id = QueueId::new();
        let name: Arc<str> = Arc::from(config.name);
        // Capacity 1: submissions are a handoff, the acknowledgement is what
        // callers actually wait on.
        let (commands, command_rx) = mpsc::channel(1);
        let (stats_tx, stats) = watch::channel(QueueStats::default());

        let control = ControlLoop::new(
            id,
            Arc::clone(&name),
            handler,
            config.concurrency_limit,
            command_rx,
            stats_tx,
        );
        let span = tracing::info_span!("queue.control", "queue.name" = %name, "queue.id" = %id);
        tokio::spawn(control.run().instrument(span));

        Self {
            id,
            name,
            concurrency_limit: config.concurrency_limit,
            commands,
            stats,
        }
    }
}

impl<T> WorkQueue<T> {
    /// Hand an item to the queue.
    ///
    /// Returns once the control loop has put the item on the backlog, never
    /// waiting for the item to run.
    ///
    /// # Errors
    ///
    /// [`Error::Stopped`] if a stop has been requested, [`Error::Closed`] if
    /// the queue has terminated.
    pub async fn submit(&self, item: T) -> Result<TaskId> {
        let (ack, accepted) = oneshot::channel();
        self.commands
            .send(Command::Submit { item, ack })
            .await
            .map_err(|_| Error::Closed)?;
        accepted.await.map_err(|_| Error::Closed)?
    }

    /// Request a graceful stop: reject new submissions, finish everything
    /// already accepted. Repeated calls, and calls after termination, are
    /// no-ops.
    pub async fn stop(&self) {
        self.stop_with(StopMode::Drain).await;
    }

    /// Request a stop with an explicit policy for the unadmitted backlog.
    pub async fn stop_with(&self, mode: StopMode) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Stop { mode, ack }).await.is_ok() {
            // A dropped ack means the loop exited meanwhile; nothing left to stop.
            let _ = done.await;
        }
    }

    /// Wait until every item accepted before this call has finished (or
    /// been discarded).
    ///
    /// The target is fixed when `wait` is called, so items submitted
    /// afterwards, from this handle or any clone, never hold it up. Returns
    /// immediately when nothing accepted so far is pending.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if the control loop vanished with work still pending,
    /// which only happens if the runtime is shutting down underneath it.
    pub fn wait(&self) -> impl Future<Output = Result<()>> + use<T> {
        let mut stats = self.stats.clone();
        let target = stats.borrow().submitted;
        async move {
            let reached = stats.wait_for(|s| s.settled >= target).await.is_ok();
            if reached || stats.borrow().settled >= target {
                Ok(())
            } else {
                Err(Error::Closed)
            }
        }
    }

    /// Wait until the control loop has terminated.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if the loop exited without reaching
    /// [`QueueState::Terminated`](crate::model::QueueState::Terminated).
    pub async fn closed(&self) -> Result<()> {
        let mut stats = self.stats.clone();
        let reached = stats.wait_for(|s| s.state.is_terminal()).await.is_ok();
        if reached || stats.borrow().state.is_terminal() {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    /// Stop gracefully and wait for the control loop to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await;
        self.closed().await
    }

    /// Latest statistics published by the control loop.
    pub fn stats(&self) -> QueueStats {
        *self.stats.borrow()
    }

    pub fn is_accepting(&self) -> bool {
        self.stats.borrow().state.accepts_submissions()
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency_limit(&self) -> ConcurrencyLimit {
        self.concurrency_limit
    }
}
