//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on malformed values. Nothing is
//! required; every variable has a default.

pub mod simulation;

use crate::error::{Error, Result};
use crate::model::ConcurrencyLimit;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use simulation::{HedgedSimConfig, QueueSimConfig, SimulationConfig};

/// Default per-queue concurrency limit when `TASKQ_CONCURRENCY_LIMIT` is unset.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

#[derive(Debug)]
pub struct Config {
    /// Per-queue limit. `TASKQ_CONCURRENCY_LIMIT=0` means unlimited.
    pub concurrency_limit: ConcurrencyLimit,
    /// TOML file with simulation parameters.
    pub simulation_file: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let concurrency_limit: usize =
            parsed_var("TASKQ_CONCURRENCY_LIMIT")?.unwrap_or(DEFAULT_CONCURRENCY_LIMIT);

        Ok(Self {
            concurrency_limit: concurrency_limit.into(),
            simulation_file: optional_var("TASKQ_SIMULATION_FILE").map(PathBuf::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Resolve the simulation parameters.
    ///
    /// `file` (the `--config` flag) wins over `TASKQ_SIMULATION_FILE`. With
    /// neither set, the defaults apply and the queue simulation takes its
    /// limit from `TASKQ_CONCURRENCY_LIMIT`; a file always sets its own.
    pub fn simulation(&self, file: Option<&Path>) -> Result<SimulationConfig> {
        if let Some(path) = file.or(self.simulation_file.as_deref()) {
            return SimulationConfig::load(path);
        }
        let mut simulation = SimulationConfig::default();
        simulation.queue.concurrency_limit = self.concurrency_limit.get().unwrap_or(0);
        Ok(simulation)
    }
}

/// Set and non-empty, else `None`.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {name}={raw}: {e}")))
        })
        .transpose()
}
