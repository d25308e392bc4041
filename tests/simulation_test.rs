//! Tests for the latency simulations.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskq::config::{HedgedSimConfig, QueueSimConfig};
use taskq::sim::{LatencyProfile, LatencyRecorder, hedged, queue};

fn profile(high_rate: f64) -> LatencyProfile {
    LatencyProfile {
        low: Duration::from_millis(1),
        high: Duration::from_millis(40),
        high_rate,
    }
}

// ---------------------------------------------------------------------------
// LatencyProfile / LatencyRecorder
// ---------------------------------------------------------------------------

#[test]
fn profile_extremes_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..100 {
        assert_eq!(profile(0.0).sample(&mut rng), Duration::from_millis(1));
        assert_eq!(profile(1.0).sample(&mut rng), Duration::from_millis(40));
    }
}

#[test]
fn profile_mixes_at_roughly_the_configured_rate() {
    let mut rng = StdRng::seed_from_u64(42);
    let high = (0..10_000)
        .filter(|_| profile(0.2).sample(&mut rng) == Duration::from_millis(40))
        .count();
    assert!((1_500..2_500).contains(&high), "high samples: {high}");
}

#[test]
fn recorder_keeps_first_sample_per_task() {
    let recorder = LatencyRecorder::new();
    assert!(recorder.is_empty());
    assert_eq!(recorder.average_ms(), None);

    assert!(recorder.record_first(1, Duration::from_millis(10)));
    assert!(!recorder.record_first(1, Duration::from_millis(500)));
    assert!(recorder.record_first(2, Duration::from_millis(30)));

    let shared = recorder.clone();
    assert!(shared.contains(1));
    assert_eq!(shared.len(), 2);
    assert!(!shared.contains(3));
    assert_eq!(recorder.average_ms(), Some(20.0));
}

// ---------------------------------------------------------------------------
// Queue simulation
// ---------------------------------------------------------------------------

fn small_queue_sim(tied_requests: bool) -> QueueSimConfig {
    QueueSimConfig {
        low_latency_ms: 1,
        high_latency_ms: 5,
        high_latency_rate: 0.1,
        queue_count: 3,
        concurrency_limit: 2,
        task_count: 30,
        tied_requests,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_simulation_records_every_task() {
    let report = queue::run(&small_queue_sim(false)).await.unwrap();
    assert_eq!(report.tasks, 30);
    assert_eq!(report.recorded, 30);
    assert_eq!(report.skipped_copies, 0);
    assert!(report.average_latency_ms >= 1.0);
    assert!(report.average_latency_ms <= 5.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tied_simulation_records_each_task_once() {
    let report = queue::run(&small_queue_sim(true)).await.unwrap();
    assert!(report.tied_requests);
    assert_eq!(report.recorded, 30);
    assert!(report.average_latency_ms >= 1.0);
}

#[tokio::test]
async fn queue_simulation_rejects_invalid_config() {
    let config = QueueSimConfig {
        queue_count: 0,
        ..small_queue_sim(false)
    };
    assert!(queue::run(&config).await.is_err());
}

// ---------------------------------------------------------------------------
// Hedged requests
// ---------------------------------------------------------------------------

fn policy(max_timeout_ms: u64, candidates: usize) -> hedged::HedgePolicy {
    hedged::HedgePolicy {
        max_timeout: Duration::from_millis(max_timeout_ms),
        candidates,
        max_depth: 16,
    }
}

/// Hands out the scripted latencies in order, then `fallback` forever.
fn scripted(latencies: &[u64], fallback: u64) -> hedged::LatencySampler {
    let script = Mutex::new(latencies.iter().copied().collect::<VecDeque<_>>());
    Arc::new(move || {
        let next = script.lock().unwrap().pop_front().unwrap_or(fallback);
        Duration::from_millis(next)
    })
}

#[tokio::test]
async fn fast_primary_is_never_hedged() {
    let outcome = hedged::race(Duration::from_millis(2), policy(10, 1), scripted(&[1], 1)).await;
    assert_eq!(outcome.latency, Duration::from_millis(2));
    assert!(!outcome.hedged);
    assert!(!outcome.hedge_won);
}

#[tokio::test]
async fn fast_hedge_beats_slow_primary() {
    let outcome = hedged::race(Duration::from_millis(200), policy(5, 1), scripted(&[1], 200)).await;
    assert_eq!(outcome.latency, Duration::from_millis(6));
    assert!(outcome.hedged);
    assert!(outcome.hedge_won);
}

#[tokio::test]
async fn slow_hedge_hedges_again_and_beats_slow_primary() {
    // Primary 1000ms; the first hedge is just as slow, so after another
    // 10ms it hedges itself with a 5ms attempt: 10 + 10 + 5.
    let outcome = hedged::race(
        Duration::from_millis(1000),
        policy(10, 1),
        scripted(&[1000, 5], 1000),
    )
    .await;
    assert_eq!(outcome.latency, Duration::from_millis(25));
    assert!(outcome.hedged);
    assert!(outcome.hedge_won);
}

#[tokio::test]
async fn hedges_stop_hedging_at_max_depth() {
    // Same script, but hedges may not hedge again: the primary wins.
    let policy = hedged::HedgePolicy {
        max_depth: 1,
        ..policy(10, 1)
    };
    let outcome = hedged::race(Duration::from_millis(100), policy, scripted(&[100, 5], 100)).await;
    assert_eq!(outcome.latency, Duration::from_millis(100));
    assert!(outcome.hedged);
    assert!(!outcome.hedge_won);
}

#[tokio::test]
async fn slow_hedges_lose_to_primary() {
    // Every hedge, and every hedge of a hedge, takes 200ms.
    let outcome = hedged::race(Duration::from_millis(20), policy(5, 1), scripted(&[], 200)).await;
    assert_eq!(outcome.latency, Duration::from_millis(20));
    assert!(outcome.hedged);
    assert!(!outcome.hedge_won);
}

#[tokio::test]
async fn no_candidates_waits_for_primary() {
    let outcome = hedged::race(Duration::from_millis(15), policy(5, 0), scripted(&[1], 1)).await;
    assert_eq!(outcome.latency, Duration::from_millis(15));
    assert!(outcome.hedged);
    assert!(!outcome.hedge_won);
}

#[tokio::test]
async fn hedged_simulation_without_slow_requests_averages_low_latency() {
    let config = HedgedSimConfig {
        low_latency_ms: 1,
        high_latency_ms: 50,
        high_latency_rate: 0.0,
        max_timeout_ms: 10,
        candidates: 1,
        max_hedge_depth: 16,
        request_count: 20,
    };
    let report = hedged::run(&config).await.unwrap();
    assert_eq!(report.requests, 20);
    assert_eq!(report.hedged, 0);
    assert!((report.average_latency_ms - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn hedged_simulation_with_only_slow_requests_always_hedges() {
    let config = HedgedSimConfig {
        low_latency_ms: 1,
        high_latency_ms: 30,
        high_latency_rate: 1.0,
        max_timeout_ms: 5,
        candidates: 1,
        max_hedge_depth: 16,
        request_count: 3,
    };
    let report = hedged::run(&config).await.unwrap();
    assert_eq!(report.hedged, 3);
    // Every level of hedging is just as slow, so each hedge answers after
    // the primary and the primary always wins.
    assert_eq!(report.hedge_wins, 0);
    assert!((report.average_latency_ms - 30.0).abs() < 1e-9);
}
