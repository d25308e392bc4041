//! Task latency simulation over a set of work queues.
//!
//! Each task is submitted either to one randomly chosen queue or, with tied
//! requests, to every queue. A tied copy whose task has already finished
//! elsewhere is skipped before it sleeps.

use super::LatencyRecorder;
use crate::config::QueueSimConfig;
use crate::error::Result;
use crate::queue::{QueueConfig, WorkQueue};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Summary of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub tasks: u64,
    /// Tasks with a recorded latency. Equals `tasks` after a full run.
    pub recorded: usize,
    /// Tied copies that never ran because another copy had finished.
    pub skipped_copies: u64,
    pub queue_count: usize,
    pub concurrency_limit: usize,
    pub tied_requests: bool,
    pub average_latency_ms: f64,
    pub elapsed_ms: u64,
}

/// Run the simulation described by `config` and wait for every queue to drain.
pub async fn run(config: &QueueSimConfig) -> Result<QueueReport> {
    config.validate()?;

    let recorder = LatencyRecorder::new();
    let skipped = Arc::new(AtomicU64::new(0));
    let profile = config.profile();
    let tied = config.tied_requests;
    let started = Instant::now();

    let queues: Vec<WorkQueue<u64>> = (0..config.queue_count)
        .map(|index| {
            let recorder = recorder.clone();
            let skipped = Arc::clone(&skipped);
            let queue_config =
                QueueConfig::new(config.concurrency_limit).name(format!("sim-{index}"));
            WorkQueue::with_config(queue_config, move |task: u64| {
                let recorder = recorder.clone();
                let skipped = Arc::clone(&skipped);
                async move {
                    if tied && recorder.contains(task) {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    let latency = profile.sample_random();
                    tokio::time::sleep(latency).await;
                    recorder.record_first(task, latency);
                }
            })
        })
        .collect();

    for task in 0..config.task_count {
        if tied {
            for queue in &queues {
                queue.submit(task).await?;
            }
        } else {
            let index = rand::thread_rng().gen_range(0..queues.len());
            queues[index].submit(task).await?;
        }
    }

    for queue in &queues {
        queue.wait().await?;
    }
    for queue in &queues {
        queue.shutdown().await?;
    }

    let report = QueueReport {
        tasks: config.task_count,
        recorded: recorder.len(),
        skipped_copies: skipped.load(Ordering::Relaxed),
        queue_count: config.queue_count,
        concurrency_limit: config.concurrency_limit,
        tied_requests: tied,
        average_latency_ms: recorder.average_ms().unwrap_or(0.0),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        tasks = report.tasks,
        recorded = report.recorded,
        average_latency_ms = report.average_latency_ms,
        elapsed_ms = report.elapsed_ms,
        "queue simulation finished"
    );
    Ok(report)
}
