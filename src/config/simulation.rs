//! Simulation parameters, loaded from TOML.
//!
//! ```toml
//! [queue]
//! queue_count = 10
//! concurrency_limit = 10
//! task_count = 1000
//! tied_requests = true
//!
//! [hedged]
//! max_timeout_ms = 10
//! candidates = 1
//! max_hedge_depth = 16
//! ```
//!
//! Every field is optional; omitted ones take the defaults below.

use crate::error::{Error, Result};
use crate::sim::LatencyProfile;
use crate::sim::hedged::HedgePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub queue: QueueSimConfig,
    pub hedged: HedgedSimConfig,
}

impl SimulationConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad simulation config {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SimulationConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        self.hedged.validate()
    }
}

/// Latency simulation over a set of work queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSimConfig {
    pub low_latency_ms: u64,
    pub high_latency_ms: u64,
    /// Probability in `[0, 1]` that a task takes `high_latency_ms`.
    pub high_latency_rate: f64,
    pub queue_count: usize,
    /// Per-queue limit; `0` is unlimited.
    pub concurrency_limit: usize,
    pub task_count: u64,
    /// Submit every task to every queue and keep the first finisher.
    pub tied_requests: bool,
}

impl Default for QueueSimConfig {
    fn default() -> Self {
        Self {
            low_latency_ms: 5,
            high_latency_ms: 1000,
            high_latency_rate: 0.01,
            queue_count: 10,
            concurrency_limit: 10,
            task_count: 1000,
            tied_requests: false,
        }
    }
}

impl QueueSimConfig {
    pub fn profile(&self) -> LatencyProfile {
        LatencyProfile {
            low: Duration::from_millis(self.low_latency_ms),
            high: Duration::from_millis(self.high_latency_ms),
            high_rate: self.high_latency_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_latencies(
            "queue",
            self.low_latency_ms,
            self.high_latency_ms,
            self.high_latency_rate,
        )?;
        if self.queue_count == 0 {
            return Err(Error::Config("queue.queue_count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Hedged request simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HedgedSimConfig {
    pub low_latency_ms: u64,
    pub high_latency_ms: u64,
    pub high_latency_rate: f64,
    /// How long to wait on the primary before sending hedges.
    pub max_timeout_ms: u64,
    /// Hedge attempts launched once the timeout fires.
    pub candidates: usize,
    /// Levels of hedges that may hedge again below one request.
    pub max_hedge_depth: u32,
    pub request_count: u64,
}

impl Default for HedgedSimConfig {
    fn default() -> Self {
        Self {
            low_latency_ms: 5,
            high_latency_ms: 1000,
            high_latency_rate: 0.2,
            max_timeout_ms: 10,
            candidates: 1,
            max_hedge_depth: 16,
            request_count: 1000,
        }
    }
}

impl HedgedSimConfig {
    pub fn profile(&self) -> LatencyProfile {
        LatencyProfile {
            low: Duration::from_millis(self.low_latency_ms),
            high: Duration::from_millis(self.high_latency_ms),
            high_rate: self.high_latency_rate,
        }
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn policy(&self) -> HedgePolicy {
        HedgePolicy {
            max_timeout: self.max_timeout(),
            candidates: self.candidates,
            max_depth: self.max_hedge_depth,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_latencies(
            "hedged",
            self.low_latency_ms,
            self.high_latency_ms,
            self.high_latency_rate,
        )
    }
}

fn validate_latencies(section: &str, low: u64, high: u64, rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(Error::Config(format!(
            "{section}.high_latency_rate must be within [0, 1], got {rate}"
        )));
    }
    if high < low {
        return Err(Error::Config(format!(
            "{section}.high_latency_ms ({high}) is below low_latency_ms ({low})"
        )));
    }
    Ok(())
}
