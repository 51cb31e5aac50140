//! Loading jobs from YAML files.

mod common;

use common::{Journal, config};
use sluice_core::prelude::*;
use sluice_executor::engine::{Engine, FailurePolicy};
use sluice_executor::job::JobSpec;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn write_job(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn run_job_from_file() {
    let file = write_job(
        r#"
settings:
  max_cycles: 3
  failure_policy: skip_cycle
components:
  - type: relay
    name: source
    props:
      Outputs: [event]
  - type: relay
    name: sink
    props:
      Inputs: [event]
      FailOnCycle: 1
"#,
    );

    let job = JobSpec::from_file(file.path()).unwrap();
    assert_eq!(job.components.len(), 2);

    let journal = Journal::new();
    let mut engine = Engine::from_job(&job, config(50), common::registry(&journal)).unwrap();
    assert_eq!(engine.config().max_cycles, Some(3));
    assert_eq!(engine.config().failure_policy, FailurePolicy::SkipCycle);

    let observed = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&observed);
    engine.set_cycle_observer(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let report = engine.run_all().await.unwrap();
    assert_eq!(report.cycles_completed, 2);
    assert_eq!(report.cycles_skipped, 1);
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JobSpec::from_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, SluiceError::Io { .. }));
}

#[test]
fn malformed_file_reports_its_path() {
    let file = write_job("components: {not: [a, list}\n");
    match JobSpec::from_file(file.path()).unwrap_err() {
        SluiceError::YamlParse { path, .. } => assert_eq!(path, file.path()),
        other => panic!("expected YamlParse, got {other}"),
    }
}

#[test]
fn unknown_type_in_job_fails_assembly() {
    let job = JobSpec::from_yaml(
        r#"
components:
  - type: teleporter
    name: t
"#,
    )
    .unwrap();
    let journal = Journal::new();
    let err = Engine::from_job(&job, config(1), common::registry(&journal)).unwrap_err();
    assert!(matches!(err, SluiceError::UnknownType { .. }));
}

#[test]
fn override_with_wrong_kind_fails_assembly() {
    let job = JobSpec::from_yaml(
        r#"
components:
  - type: producer
    name: t1
    props:
      A: "one"
"#,
    )
    .unwrap();
    let journal = Journal::new();
    let err = Engine::from_job(&job, config(1), common::registry(&journal)).unwrap_err();
    assert!(matches!(err, SluiceError::TypeMismatch { .. }));
}

#[test]
fn mixed_key_list_fails_assembly() {
    let job = JobSpec::from_yaml(
        r#"
components:
  - type: relay
    name: sink
    props:
      Inputs: [event, 7]
"#,
    )
    .unwrap();
    let journal = Journal::new();
    let err = Engine::from_job(&job, config(1), common::registry(&journal)).unwrap_err();
    assert!(matches!(err, SluiceError::TypeMismatch { .. }));
}

#[tokio::test]
async fn non_string_keys_fail_configuration() {
    let job = JobSpec::from_yaml(
        r#"
components:
  - type: relay
    name: sink
    props:
      Inputs: [7]
"#,
    )
    .unwrap();
    let journal = Journal::new();
    let mut engine = Engine::from_job(&job, config(1), common::registry(&journal)).unwrap();
    let err = engine.run_all().await.unwrap_err();
    assert!(matches!(err.root(), SluiceError::TypeMismatch { .. }));
    assert!(journal.events_with("process:").is_empty());
}
