//! Lifecycle ordering and state-machine enforcement.

mod common;

use common::{Journal, config, engine, relay};
use sluice_core::error::DeclarationKind;
use sluice_core::prelude::*;

fn chain(engine: &mut sluice_executor::engine::Engine) {
    relay(engine, "t3", &["b"], &[]);
    relay(engine, "t2", &["a"], &["b"]);
    relay(engine, "t1", &[], &["a"]);
}

#[tokio::test]
async fn hooks_follow_dependency_order() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(2));
    chain(&mut engine);
    engine.create("counter", "counter").unwrap();

    engine.run_all().await.unwrap();

    assert_eq!(
        journal.events_with("configure:"),
        vec!["counter", "t3", "t2", "t1"]
    );
    assert_eq!(journal.events_with("start:"), vec!["counter", "t1", "t2", "t3"]);
    assert_eq!(journal.events_with("stop:"), vec!["t3", "t2", "t1", "counter"]);
    assert_eq!(engine.state(), RunState::Offline);
}

#[tokio::test]
async fn state_advances_through_every_phase() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    chain(&mut engine);

    assert_eq!(engine.state(), RunState::Undefined);
    engine.configure().unwrap();
    assert_eq!(engine.state(), RunState::Configured);
    engine.start().unwrap();
    assert_eq!(engine.state(), RunState::Started);
    engine.run().await.unwrap();
    assert_eq!(engine.state(), RunState::Stopping);
    engine.stop().unwrap();
    assert_eq!(engine.state(), RunState::Stopped);
    engine.shutdown().unwrap();
    assert_eq!(engine.state(), RunState::Offline);
}

#[tokio::test]
async fn out_of_order_calls_fail_without_rollback() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    chain(&mut engine);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(
        err,
        SluiceError::IllegalStateTransition {
            current: RunState::Undefined,
            ..
        }
    ));
    assert!(engine.start().is_err());
    assert!(engine.stop().is_err());
    assert_eq!(engine.state(), RunState::Undefined);

    engine.configure().unwrap();
    assert!(engine.configure().is_err());
    assert!(engine.create("relay", "late").is_err());
    assert!(matches!(
        engine.set_property("t1", "DelayMs", 5i64).unwrap_err(),
        SluiceError::IllegalStateTransition { .. }
    ));
    assert_eq!(engine.state(), RunState::Configured);

    engine.start().unwrap();
    engine.run().await.unwrap();
    assert!(engine.run().await.is_err());
    assert!(engine.shutdown().is_err());
    assert_eq!(engine.state(), RunState::Stopping);

    engine.stop().unwrap();
    engine.shutdown().unwrap();
    assert!(engine.configure().is_err());
    assert_eq!(engine.state(), RunState::Offline);
}

#[tokio::test]
async fn stop_failures_do_not_block_teardown() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    chain(&mut engine);
    engine.set_property("t2", "FailStop", true).unwrap();

    let err = engine.run_all().await.unwrap_err();
    match err {
        SluiceError::StopFailures { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "t2");
        }
        other => panic!("expected StopFailures, got {other}"),
    }
    assert_eq!(journal.events_with("stop:"), vec!["t3", "t2", "t1"]);
    assert_eq!(engine.state(), RunState::Offline);
}

#[test]
fn start_failure_is_wrapped_and_halts() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    chain(&mut engine);
    engine.set_property("t2", "FailStart", true).unwrap();
    engine.configure().unwrap();

    match engine.start().unwrap_err() {
        SluiceError::ComponentFailure {
            component, phase, ..
        } => {
            assert_eq!(component, "t2");
            assert_eq!(phase, Phase::Start);
        }
        other => panic!("expected ComponentFailure, got {other}"),
    }
    assert_eq!(journal.events_with("start:"), vec!["t1", "t2"]);
    assert_eq!(engine.state(), RunState::Starting);
}

#[test]
fn instance_names_are_unique() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    engine.create("producer", "x").unwrap();

    match engine.create("squarer", "x").unwrap_err() {
        SluiceError::DuplicateDeclaration {
            kind,
            owner,
            claimant,
            ..
        } => {
            assert_eq!(kind, DeclarationKind::ComponentInstance);
            assert_eq!(owner, "producer");
            assert_eq!(claimant, "squarer");
        }
        other => panic!("expected DuplicateDeclaration, got {other}"),
    }
}

#[test]
fn unknown_type_and_component() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    assert!(matches!(
        engine.create("nope", "n").unwrap_err(),
        SluiceError::UnknownType { .. }
    ));
    assert!(matches!(
        engine.set_property("n", "A", 1.0).unwrap_err(),
        SluiceError::UnknownComponent { .. }
    ));
}

#[test]
fn property_overrides_are_checked() {
    let journal = Journal::new();
    let mut engine = engine(&journal, config(1));
    engine.create("producer", "t1").unwrap();

    assert!(matches!(
        engine.set_property("t1", "A", "text").unwrap_err(),
        SluiceError::TypeMismatch { .. }
    ));
    assert!(matches!(
        engine.set_property("t1", "Missing", 1.0).unwrap_err(),
        SluiceError::UnknownProperty { .. }
    ));
    engine.set_property("t1", "A", 5.0).unwrap();
    assert!(matches!(
        engine.set_property("t1", "A", 6.0).unwrap_err(),
        SluiceError::PropertyAlreadyOverridden { .. }
    ));
    assert_eq!(engine.property("t1", "A").unwrap(), &Value::Float(5.0));
}
