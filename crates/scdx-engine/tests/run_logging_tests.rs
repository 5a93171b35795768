#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Structured log events emitted by snapshot runs

mod common;

use common::{competing_plan, customer, rows, runner_at, ts, InterferingStore};
use scdx_core::history::MemoryHistory;
use scdx_core::logging_facility::test_capture::init_test_capture;
use scdx_core::{RetryPolicy, SnapshotConfig};
use scdx_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_RETRY, EVENT_START};
use tracing::Level;

const OP: &str = "snapshot_run";

#[test]
fn test_committed_run_logs_start_and_end() {
    let capture = init_test_capture();
    let config = SnapshotConfig::new("dim_logged_commit", "id", "updated_at");

    let report = runner_at(MemoryHistory::new(), 9)
        .run(&config, &rows(vec![customer(1, "A", 1), customer(2, "B", 1)]))
        .unwrap();

    let events: Vec<_> = capture
        .events_for_run(report.run_id.as_str())
        .into_iter()
        .filter(|e| e.op.as_deref() == Some(OP))
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event.as_deref(), Some(EVENT_START));
    assert_eq!(events[0].field("target"), Some("dim_logged_commit"));
    assert_eq!(events[0].field("rows_in"), Some("2"));
    assert_eq!(events[1].event.as_deref(), Some(EVENT_END));
    assert_eq!(events[1].field("keys_new"), Some("2"));
    assert!(events[1].field("duration_ms").is_some());
}

#[test]
fn test_failed_run_logs_error_code() {
    let capture = init_test_capture();
    let config = SnapshotConfig::new("dim_logged_failure", "id", "updated_at");

    let err = runner_at(MemoryHistory::new(), 9)
        .run(&config, &rows(vec![serde_json::json!({"id": 1})]))
        .unwrap_err();

    let errors = capture.run_events(err.run_id().unwrap().as_str(), OP, EVENT_END_ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].level, Level::ERROR);
    assert_eq!(errors[0].field("err.code"), Some("ERR_VALIDATION"));
}

#[test]
fn test_write_conflict_logs_retry() {
    let capture = init_test_capture();
    let store = MemoryHistory::new();
    let config = SnapshotConfig::new("dim_logged_retry", "id", "updated_at")
        .with_retry(RetryPolicy::immediate(2));
    runner_at(&store, 8)
        .run(&config, &rows(vec![customer(1, "A", 1)]))
        .unwrap();
    let competitor = competing_plan(&store, &config, vec![customer(1, "C", 2)], ts(8));

    let report = runner_at(InterferingStore::new(&store, vec![competitor]), 9)
        .run(&config, &rows(vec![customer(1, "B", 3)]))
        .unwrap();

    let retries = capture.run_events(report.run_id.as_str(), OP, EVENT_RETRY);
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].field("attempt"), Some("1"));
    assert_eq!(retries[0].level, Level::WARN);
    assert_eq!(report.attempts, 2);
}
