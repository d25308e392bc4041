//! Tests for the core data model.

use taskq::{ConcurrencyLimit, QueueId, QueueState, QueueStats, StopMode, TaskId, TaskOutcome};

// ---------------------------------------------------------------------------
// ConcurrencyLimit
// ---------------------------------------------------------------------------

#[test]
fn zero_limit_means_unlimited() {
    let limit = ConcurrencyLimit::from(0);
    assert_eq!(limit, ConcurrencyLimit::Unlimited);
    assert_eq!(limit.get(), None);
    assert!(limit.admits(1_000_000));
    assert_eq!(limit.to_string(), "unlimited");
}

#[test]
fn bounded_limit_admits_below_max_only() {
    let limit = ConcurrencyLimit::from(3);
    assert_eq!(limit.get(), Some(3));
    assert!(limit.admits(0));
    assert!(limit.admits(2));
    assert!(!limit.admits(3));
    assert!(!limit.admits(4));
    assert_eq!(limit.to_string(), "3");
}

// ---------------------------------------------------------------------------
// QueueState
// ---------------------------------------------------------------------------

#[test]
fn queue_state_only_moves_forward() {
    use QueueState::*;
    assert!(Running.can_transition_to(Stopping));
    assert!(Stopping.can_transition_to(Terminated));

    assert!(!Running.can_transition_to(Terminated));
    assert!(!Stopping.can_transition_to(Running));
    assert!(!Terminated.can_transition_to(Running));
    assert!(!Terminated.can_transition_to(Stopping));
}

#[test]
fn only_running_accepts_submissions() {
    assert!(QueueState::Running.accepts_submissions());
    assert!(!QueueState::Stopping.accepts_submissions());
    assert!(!QueueState::Terminated.accepts_submissions());
    assert!(QueueState::Terminated.is_terminal());
    assert!(!QueueState::Stopping.is_terminal());
}

#[test]
fn queue_state_serializes_snake_case() {
    let json = serde_json::to_string(&QueueState::Stopping).unwrap();
    assert_eq!(json, "\"stopping\"");
    assert_eq!(QueueState::Terminated.to_string(), "terminated");
}

// ---------------------------------------------------------------------------
// StopMode, TaskOutcome, ids
// ---------------------------------------------------------------------------

#[test]
fn stop_mode_parses_known_names() {
    assert_eq!("drain".parse::<StopMode>().unwrap(), StopMode::Drain);
    assert_eq!("discard".parse::<StopMode>().unwrap(), StopMode::Discard);
    assert!("abandon".parse::<StopMode>().is_err());
    assert_eq!(StopMode::default(), StopMode::Drain);
}

#[test]
fn task_outcome_labels() {
    assert!(TaskOutcome::Completed.is_success());
    let panicked = TaskOutcome::Panicked {
        message: "boom".to_string(),
    };
    assert!(!panicked.is_success());
    assert_eq!(panicked.label(), "panicked");
    assert_eq!(TaskOutcome::Aborted.label(), "aborted");
}

#[test]
fn ids_display_compactly() {
    assert_eq!(TaskId(42).to_string(), "#42");
    assert_eq!(QueueId::new().to_string().len(), 8);
    assert_ne!(QueueId::new(), QueueId::new());
}

#[test]
fn default_stats_are_idle_and_running() {
    let stats = QueueStats::default();
    assert_eq!(stats.state, QueueState::Running);
    assert_eq!(stats.pending(), 0);
    assert_eq!(stats.settled, 0);

    let busy = QueueStats {
        backlog: 2,
        in_flight: 1,
        ..stats
    };
    assert_eq!(busy.pending(), 3);
}
