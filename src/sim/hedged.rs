//! Hedged request simulation.
//!
//! A request that has not answered within `max_timeout` gets `candidates`
//! hedge attempts. Each hedge is itself a hedged request: when it is slow
//! too, it hedges again after another `max_timeout`. The first of the
//! primary and the hedges to answer wins; the losers are dropped, which
//! aborts their own hedges in turn.

use super::LatencyProfile;
use crate::config::HedgedSimConfig;
use crate::error::Result;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Draws the latency of each attempt, primary and hedges alike.
pub type LatencySampler = Arc<dyn Fn() -> Duration + Send + Sync>;

type Attempt = Pin<Box<dyn Future<Output = RequestOutcome> + Send>>;

/// When and how wide to hedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HedgePolicy {
    /// How long an attempt may run before it is hedged.
    pub max_timeout: Duration,
    /// Hedge attempts launched per timeout.
    pub candidates: usize,
    /// How many levels of hedges-of-hedges may be launched below a primary.
    pub max_depth: u32,
}

/// How a single request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    /// Latency seen by the caller.
    pub latency: Duration,
    /// Whether the timeout fired and hedges were sent.
    pub hedged: bool,
    /// Whether a hedge answered before the primary.
    pub hedge_won: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HedgedReport {
    pub requests: u64,
    pub hedged: u64,
    pub hedge_wins: u64,
    pub average_latency_ms: f64,
}

/// Issue one simulated request with hedging, sampling every latency from
/// `profile`.
pub async fn hedged_request(profile: &LatencyProfile, policy: HedgePolicy) -> RequestOutcome {
    let profile = *profile;
    let sample: LatencySampler = Arc::new(move || profile.sample_random());
    let primary = sample();
    race(primary, policy, sample).await
}

/// Race an attempt taking `primary` against hedges launched once
/// `policy.max_timeout` has passed without an answer. Hedge latencies come
/// from `sample`; a hedge that wins reports `max_timeout` plus its own
/// (possibly hedged) latency.
pub fn race(primary: Duration, policy: HedgePolicy, sample: LatencySampler) -> Attempt {
    attempt(primary, policy, sample, policy.max_depth)
}

fn attempt(
    primary: Duration,
    policy: HedgePolicy,
    sample: LatencySampler,
    depth: u32,
) -> Attempt {
    Box::pin(async move {
        if primary <= policy.max_timeout {
            tokio::time::sleep(primary).await;
            return RequestOutcome {
                latency: primary,
                hedged: false,
                hedge_won: false,
            };
        }

        tokio::time::sleep(policy.max_timeout).await;

        let mut hedges = JoinSet::new();
        if depth > 0 {
            for _ in 0..policy.candidates {
                let latency = sample();
                hedges.spawn(attempt(latency, policy, Arc::clone(&sample), depth - 1));
            }
        }

        tokio::select! {
            Some(Ok(hedge)) = hedges.join_next() => RequestOutcome {
                latency: policy.max_timeout + hedge.latency,
                hedged: true,
                hedge_won: true,
            },
            _ = tokio::time::sleep(primary - policy.max_timeout) => RequestOutcome {
                latency: primary,
                hedged: true,
                hedge_won: false,
            },
        }
    })
}

/// Run `request_count` hedged requests one after another.
pub async fn run(config: &HedgedSimConfig) -> Result<HedgedReport> {
    config.validate()?;

    let profile = config.profile();
    let policy = config.policy();
    let mut hedged = 0;
    let mut hedge_wins = 0;
    let mut total = Duration::ZERO;

    for request in 0..config.request_count {
        let outcome = hedged_request(&profile, policy).await;
        debug!(
            request,
            latency_ms = outcome.latency.as_millis() as u64,
            hedged = outcome.hedged,
            hedge_won = outcome.hedge_won,
            "request finished"
        );
        hedged += u64::from(outcome.hedged);
        hedge_wins += u64::from(outcome.hedge_won);
        total += outcome.latency;
    }

    let average_latency_ms = if config.request_count == 0 {
        0.0
    } else {
        total.as_secs_f64() * 1000.0 / config.request_count as f64
    };
    let report = HedgedReport {
        requests: config.request_count,
        hedged,
        hedge_wins,
        average_latency_ms,
    };
    info!(
        requests = report.requests,
        hedged = report.hedged,
        hedge_wins = report.hedge_wins,
        average_latency_ms = report.average_latency_ms,
        "hedged simulation finished"
    );
    Ok(report)
}
