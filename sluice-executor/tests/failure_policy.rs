//! Cycle failure handling, timeouts, cancellation and end of stream.

mod common;

use common::{Journal, config, engine, relay};
use sluice_core::prelude::*;
use sluice_executor::engine::FailurePolicy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[tokio::test]
async fn first_failure_aborts_the_run() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(10));
    relay(&mut engine, "src", &[], &["a"]);
    relay(&mut engine, "dst", &["a"], &[]);
    engine.set_property("src", "FailOnCycle", 2i64).unwrap();

    let err = engine.run_all().await.unwrap_err();
    match &err {
        SluiceError::ComponentFailure {
            component, phase, ..
        } => {
            assert_eq!(component, "src");
            assert_eq!(*phase, Phase::Process);
        }
        other => panic!("expected ComponentFailure, got {other}"),
    }
    assert!(matches!(err.root(), SluiceError::Message(_)));

    let metrics = engine.metrics();
    assert_eq!(metrics.cycles_completed.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.cycles_failed.load(Ordering::Relaxed), 1);
    // The consumer never saw the failed cycle, and no later cycle started.
    assert!(!journal.events().contains(&"process:dst:2".to_string()));
    assert!(!journal.events().contains(&"process:src:3".to_string()));
    // Teardown still ran.
    assert_eq!(journal.events_with("stop:"), vec!["dst", "src"]);
    assert_eq!(engine.state(), RunState::Offline);
}

#[tokio::test]
async fn skip_policy_continues_after_failure() {
    let journal = Journal::new();
    let mut engine = engine(
        &journal,
        config(10).with_failure_policy(FailurePolicy::SkipCycle),
    );
    relay(&mut engine, "src", &[], &["a"]);
    relay(&mut engine, "dst", &["a"], &[]);
    engine.set_property("src", "FailOnCycle", 4i64).unwrap();

    let report = engine.run_all().await.unwrap();
    assert_eq!(report.cycles_started, 10);
    assert_eq!(report.cycles_completed, 9);
    assert_eq!(report.cycles_skipped, 1);
    assert!(journal.events().contains(&"process:dst:5".to_string()));
    assert!(!journal.events().contains(&"process:dst:4".to_string()));
}

#[tokio::test]
async fn slow_cycle_times_out() {
    let journal = Journal::new();
    let mut engine = engine(
        &journal,
        config(3).with_cycle_timeout(Duration::from_millis(30)),
    );
    relay(&mut engine, "sleepy", &[], &["a"]);
    engine.set_property("sleepy", "DelayMs", 2_000i64).unwrap();

    let err = engine.run_all().await.unwrap_err();
    assert!(matches!(
        err,
        SluiceError::CycleTimeout {
            cycle: 0,
            timeout_ms: 30
        }
    ));
    assert_eq!(engine.state(), RunState::Offline);
}

#[tokio::test]
async fn timeouts_can_be_skipped() {
    let journal = Journal::new();
    let mut engine = engine(
        &journal,
        config(3)
            .with_cycle_timeout(Duration::from_millis(20))
            .with_failure_policy(FailurePolicy::SkipCycle),
    );
    relay(&mut engine, "sleepy", &[], &["a"]);
    engine.set_property("sleepy", "DelayMs", 2_000i64).unwrap();

    let report = engine.run_all().await.unwrap();
    assert_eq!(report.cycles_skipped, 3);
    assert_eq!(report.cycles_completed, 0);
}

#[tokio::test]
async fn cancellation_lets_in_flight_cycles_finish() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(0).unbounded());
    relay(&mut engine, "src", &[], &["a"]);
    relay(&mut engine, "dst", &["a"], &[]);
    engine.set_property("src", "DelayMs", 10i64).unwrap();

    let token = engine.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        token.cancel();
    });

    let report = engine.run_all().await.unwrap();
    assert!(report.cancelled);
    assert!(report.cycles_completed >= 1);
    assert!(report.cycles_cancelled <= 1);
    assert_eq!(
        report.cycles_started,
        report.cycles_completed + report.cycles_cancelled
    );
    assert_eq!(engine.state(), RunState::Offline);
}

#[tokio::test]
async fn cancellation_withholds_downstream_tasks() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(0).unbounded());
    relay(&mut engine, "first", &[], &["a"]);
    relay(&mut engine, "second", &["a"], &["b"]);
    relay(&mut engine, "third", &["b"], &[]);
    for name in ["first", "second", "third"] {
        engine.set_property(name, "DelayMs", 200i64).unwrap();
    }

    let observed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&observed);
    engine.set_cycle_observer(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let token = engine.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let started = Instant::now();
    let report = engine.run_all().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(journal.events_with("process:"), vec!["first:0"]);
    assert!(elapsed < Duration::from_millis(450), "took {elapsed:?}");
    assert!(report.cancelled);
    assert_eq!(report.cycles_started, 1);
    assert_eq!(report.cycles_completed, 0);
    assert_eq!(report.cycles_cancelled, 1);
    assert_eq!(observed.load(Ordering::SeqCst), 0);
    assert_eq!(engine.metrics().cycles_active.load(Ordering::Relaxed), 0);
    assert_eq!(journal.events_with("stop:"), vec!["third", "second", "first"]);
}

#[tokio::test]
async fn cancelling_after_the_last_cycle_is_not_reported() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(2));
    relay(&mut engine, "src", &[], &["a"]);

    let token = engine.cancel_token();
    engine.set_cycle_observer(move |cycle, _| {
        if cycle.as_u64() == 1 {
            token.cancel();
        }
    });

    let report = engine.run_all().await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.cycles_completed, 2);
    assert_eq!(report.cycles_cancelled, 0);
}

#[tokio::test]
async fn zero_cycles_in_flight_still_runs() {
    let journal = Journal::new();
    let mut settings = config(3);
    settings.cycles_in_flight = 0;
    let mut engine = engine(&journal, settings);
    relay(&mut engine, "src", &[], &["a"]);
    relay(&mut engine, "dst", &["a"], &[]);

    let report = engine.run_all().await.unwrap();
    assert_eq!(report.cycles_started, 3);
    assert_eq!(report.cycles_completed, 3);
    assert_eq!(journal.events_with("process:dst:").len(), 3);
}

#[tokio::test]
async fn end_of_stream_ends_the_run_gracefully() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(0).unbounded());
    relay(&mut engine, "reader", &[], &["event"]);
    relay(&mut engine, "consumer", &["event"], &[]);
    engine.set_property("reader", "EndAtCycle", 5i64).unwrap();

    let report = engine.run_all().await.unwrap();
    assert!(report.end_of_stream);
    assert!(!report.cancelled);
    assert_eq!(report.cycles_completed, 5);
    assert_eq!(journal.events_with("process:consumer:").len(), 5);
    assert_eq!(journal.events_with("stop:"), vec!["consumer", "reader"]);
}

#[tokio::test]
async fn zero_cycles_runs_only_the_lifecycle() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(0));
    relay(&mut engine, "src", &[], &["a"]);

    let report = engine.run_all().await.unwrap();
    assert_eq!(report.cycles_started, 0);
    assert!(journal.events_with("process:").is_empty());
    assert_eq!(journal.events_with("start:"), vec!["src"]);
    assert_eq!(journal.events_with("stop:"), vec!["src"]);
}

#[tokio::test]
async fn seeder_errors_count_as_cycle_failures() {
    let journal = Journal::new();
    let mut engine = engine(
        &journal,
        config(4).with_failure_policy(FailurePolicy::SkipCycle),
    );
    relay(&mut engine, "reader", &["seed"], &[]);
    engine.set_seeder(|cycle, store| {
        if cycle.as_u64() == 1 {
            return Err(SluiceError::msg("no input for this cycle"));
        }
        store.put("seed", cycle.as_u64())
    });

    let report = engine.run_all().await.unwrap();
    assert_eq!(report.cycles_completed, 3);
    assert_eq!(report.cycles_skipped, 1);
    assert!(!journal.events().contains(&"process:reader:1".to_string()));
}

#[tokio::test]
async fn failing_seeder_does_not_starve_cancellation() {
    let journal = Journal::new();
    let mut engine = engine(
        &journal,
        config(0)
            .unbounded()
            .with_failure_policy(FailurePolicy::SkipCycle),
    );
    relay(&mut engine, "reader", &["seed"], &[]);
    engine.set_seeder(|_, _| Err(SluiceError::msg("source offline")));

    let token = engine.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let report = engine.run_all().await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.cycles_completed, 0);
    assert!(report.cycles_skipped >= 1);
    assert!(journal.events_with("process:").is_empty());
}
