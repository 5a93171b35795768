#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{at, customers, snapshot, ts};
use scdx_core::errors::{ExErrorKind, ScdxError};
use scdx_core::history::MemoryHistory;
use scdx_core::logging_facility::test_capture::init_test_capture;
use scdx_core::{log_op_end, log_op_error, log_op_start};
use scdx_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use serde_json::json;
use tracing::Level;

#[test]
fn test_log_op_start_carries_extra_fields() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, target = "dim_orders");

    let events = capture.events_for(op_name);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.as_deref(), Some(EVENT_START));
    assert_eq!(events[0].field("target"), Some("dim_orders"));
}

#[test]
fn test_log_op_end_records_duration() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let events = capture.events_for(op_name);
    assert_eq!(events.len(), 1, "Should have exactly one end event");
    assert_eq!(events[0].event.as_deref(), Some(EVENT_END));
    assert_eq!(events[0].field("duration_ms"), Some("42"));
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = ScdxError::WriteConflict {
        keys: vec!["1".to_string()],
    };
    log_op_error!(op_name, err, duration_ms = 10);

    let events = capture.events_for(op_name);
    assert_eq!(events.len(), 1, "Should have exactly one error event");
    let event = &events[0];
    assert_eq!(event.level, Level::ERROR);
    assert_eq!(event.event.as_deref(), Some(EVENT_END_ERROR));
    assert_eq!(event.field("err.code"), Some("ERR_WRITE_CONFLICT"));
    assert_eq!(
        event.field("err.kind"),
        Some(format!("{:?}", ExErrorKind::WriteConflict).as_str())
    );
}

#[test]
fn test_boundary_ownership_single_start_end() {
    let capture = init_test_capture();
    let op_name = "test_boundary_ownership_unique_4";

    log_op_start!(op_name);
    log_op_end!(op_name, duration_ms = 1);

    let events = capture.events_for(op_name);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event.as_deref(), Some(EVENT_START));
    assert_eq!(events[1].event.as_deref(), Some(EVENT_END));
}

#[test]
fn test_stale_row_logs_warning() {
    let capture = init_test_capture();
    let store = MemoryHistory::new();
    let mut config = customers().with_tracked_columns(["name"]);
    config.target = "dim_stale_warning_unique_5".to_string();

    snapshot(&store, &config, vec![json!({"id": 1, "name": "A", "updated_at": at(5)})], ts(6)).unwrap();
    snapshot(&store, &config, vec![json!({"id": 1, "name": "B", "updated_at": at(2)})], ts(7)).unwrap();

    let warnings = capture.count_events(|e| {
        e.level == Level::WARN
            && e.field("target_table") == Some("dim_stale_warning_unique_5")
            && e.field("natural_key") == Some("1")
    });
    assert_eq!(warnings, 1);
}
