//! Control loop: the single owner of a queue's backlog and counters.
//!
//! The loop reacts to one event at a time (a command from a handle or a
//! finished worker), then admits backlog items until the concurrency limit
//! or the backlog runs out, then publishes a fresh [`QueueStats`]. Between
//! events `in_flight <= limit` always holds.

use super::{Command, Handler};
use crate::error::Error;
use crate::model::{
    ConcurrencyLimit, QueueId, QueueState, QueueStats, StopMode, TaskId, TaskOutcome,
};
use crate::telemetry::metrics::QueueMetrics;
use crate::telemetry::task::{record_state_transition, start_task_span};
use opentelemetry::KeyValue;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, Span, debug, error, info, warn};

/// Acknowledgement owed to a handle, sent once the event's effects have
/// been published so callers observe them in [`QueueStats`] on return.
enum Ack {
    Submit(oneshot::Sender<Result<TaskId, Error>>, Result<TaskId, Error>),
    Stop(oneshot::Sender<()>),
}

impl Ack {
    /// The caller may have given up waiting; that is fine.
    fn send(self) {
        match self {
            Ack::Submit(tx, result) => {
                let _ = tx.send(result);
            }
            Ack::Stop(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// What a worker hands back to the loop when it finishes.
struct TaskReport {
    id: TaskId,
    elapsed: Duration,
    outcome: TaskOutcome,
    span: Span,
}

pub(crate) struct ControlLoop<T> {
    id: QueueId,
    name: Arc<str>,
    handler: Handler<T>,
    limit: ConcurrencyLimit,
    commands: mpsc::Receiver<Command<T>>,
    /// False once every handle has been dropped.
    intake_open: bool,
    stats_tx: watch::Sender<QueueStats>,
    backlog: VecDeque<(TaskId, T)>,
    /// Accepted tasks that have neither finished nor been discarded.
    outstanding: BTreeSet<TaskId>,
    workers: JoinSet<TaskReport>,
    state: QueueState,
    next_task: u64,
    stats: QueueStats,
    metrics: QueueMetrics,
    labels: Vec<KeyValue>,
}

impl<T: Send + 'static> ControlLoop<T> {
    pub(crate) fn new(
        id: QueueId,
        name: Arc<str>,
        handler: Handler<T>,
        limit: ConcurrencyLimit,
        commands: mpsc::Receiver<Command<T>>,
        stats_tx: watch::Sender<QueueStats>,
    ) -> Self {
        let labels = vec![KeyValue::new("queue", name.to_string())];
        Self {
            id,
            name,
            handler,
            limit,
            commands,
            intake_open: true,
            stats_tx,
            backlog: VecDeque::new(),
            outstanding: BTreeSet::new(),
            workers: JoinSet::new(),
            state: QueueState::Running,
            next_task: 0,
            stats: QueueStats::default(),
            metrics: QueueMetrics::new(),
            labels,
        }
    }

    /// Run until stopped and drained.
    pub(crate) async fn run(mut self) {
        info!(limit = %self.limit, "work queue started");

        loop {
            let mut ack = None;
            tokio::select! {
                command = self.commands.recv(), if self.intake_open => match command {
                    Some(command) => ack = Some(self.handle_command(command)),
                    None => {
                        debug!("all handles dropped");
                        self.intake_open = false;
                        self.begin_stop(StopMode::Drain);
                    }
                },
                Some(joined) = self.workers.join_next() => self.retire(joined),
                else => break,
            }

            self.admit();

            if self.state == QueueState::Stopping && self.is_drained() {
                self.transition(QueueState::Terminated);
            }
            self.publish();
            if let Some(ack) = ack {
                ack.send();
            }

            if self.state.is_terminal() {
                break;
            }
        }

        // Only reachable through `else` with nothing left to run.
        if !self.state.is_terminal() {
            self.transition(QueueState::Terminated);
            self.publish();
        }

        info!(
            submitted = self.stats.submitted,
            completed = self.stats.completed,
            failed = self.stats.failed,
            discarded = self.stats.discarded,
            "work queue terminated"
        );
    }

    fn handle_command(&mut self, command: Command<T>) -> Ack {
        match command {
            Command::Submit { item, ack } => {
                let result = if self.state.accepts_submissions() {
                    Ok(self.accept(item))
                } else {
                    self.stats.rejected += 1;
                    self.metrics.rejected.add(1, &self.labels);
                    warn!(state = %self.state, "submission rejected");
                    Err(Error::Stopped)
                };
                Ack::Submit(ack, result)
            }
            Command::Stop { mode, ack } => {
                self.begin_stop(mode);
                Ack::Stop(ack)
            }
        }
    }

    fn accept(&mut self, item: T) -> TaskId {
        self.next_task += 1;
        let id = TaskId(self.next_task);
        self.backlog.push_back((id, item));
        self.outstanding.insert(id);
        self.stats.submitted += 1;
        self.metrics.submitted.add(1, &self.labels);
        debug!(task = %id, backlog = self.backlog.len(), "task accepted");
        id
    }

    fn begin_stop(&mut self, mode: StopMode) {
        if self.state == QueueState::Running {
            info!(
                ?mode,
                backlog = self.backlog.len(),
                in_flight = self.workers.len(),
                "stop requested"
            );
            self.transition(QueueState::Stopping);
        } else {
            debug!(?mode, "stop already in progress");
        }

        if mode == StopMode::Discard && !self.backlog.is_empty() {
            let dropped = self.backlog.len();
            for (id, _) in self.backlog.drain(..) {
                self.outstanding.remove(&id);
            }
            self.stats.discarded += dropped as u64;
            self.metrics.discarded.add(dropped as u64, &self.labels);
            warn!(dropped, "discarded unadmitted backlog");
        }
    }

    /// Admit backlog items until the limit is reached or the backlog is empty.
    fn admit(&mut self) {
        while self.limit.admits(self.workers.len()) {
            let Some((id, item)) = self.backlog.pop_front() else {
                break;
            };
            self.dispatch(id, item);
        }
    }

    fn dispatch(&mut self, id: TaskId, item: T) {
        let span = start_task_span(&self.name, &self.id, id);
        record_state_transition(&span, "queued", "running");

        let handler = self.handler.clone();
        let report_span = span.clone();
        self.workers.spawn(
            async move {
                let started = Instant::now();
                let outcome = match handler.run(item).await {
                    Ok(()) => TaskOutcome::Completed,
                    Err(e) => outcome_from_join_error(e),
                };
                TaskReport {
                    id,
                    elapsed: started.elapsed(),
                    outcome,
                    span: report_span,
                }
            }
            .instrument(span),
        );

        self.stats.admitted += 1;
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.workers.len());
        debug!(task = %id, in_flight = self.workers.len(), "task admitted");
    }

    fn retire(&mut self, joined: Result<TaskReport, JoinError>) {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                // The wrapper itself never panics; this is runtime teardown,
                // and the loop does not outlive it.
                self.stats.failed += 1;
                error!(error = %e, "worker lost");
                return;
            }
        };

        self.outstanding.remove(&report.id);
        let duration_ms = report.elapsed.as_secs_f64() * 1000.0;
        let mut labels = self.labels.clone();
        labels.push(KeyValue::new("outcome", report.outcome.label()));
        self.metrics.completed.add(1, &labels);
        self.metrics.duration_ms.record(duration_ms, &self.labels);

        let to = if report.outcome.is_success() {
            self.stats.completed += 1;
            "completed"
        } else {
            self.stats.failed += 1;
            "failed"
        };
        record_state_transition(&report.span, "running", to);

        match &report.outcome {
            TaskOutcome::Completed => debug!(task = %report.id, duration_ms, "task completed"),
            TaskOutcome::Panicked { message } => {
                error!(task = %report.id, duration_ms, panic = %message, "handler panicked")
            }
            TaskOutcome::Aborted => error!(task = %report.id, duration_ms, "handler aborted"),
        }
    }

    fn transition(&mut self, to: QueueState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid queue transition {} -> {to}",
            self.state
        );
        info!(from = %self.state, to = %to, "queue state transition");
        self.state = to;
    }

    fn is_drained(&self) -> bool {
        self.backlog.is_empty() && self.workers.is_empty()
    }

    fn publish(&mut self) {
        self.stats.state = self.state;
        self.stats.backlog = self.backlog.len();
        self.stats.in_flight = self.workers.len();
        self.stats.settled = self
            .outstanding
            .first()
            .map_or(self.next_task, |oldest| oldest.0 - 1);
        self.stats_tx.send_replace(self.stats);
    }
}

fn outcome_from_join_error(e: JoinError) -> TaskOutcome {
    if !e.is_panic() {
        return TaskOutcome::Aborted;
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    TaskOutcome::Panicked { message }
}
