//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names consistent across log lines, error
//! reports and the run ledger.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_RUN_ID: &str = "run_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Snapshot identifiers
pub const FIELD_TARGET: &str = "target";
pub const FIELD_NATURAL_KEY: &str = "natural_key";
pub const FIELD_ATTEMPT: &str = "attempt";
pub const FIELD_PHASE: &str = "phase";

// Collection sizes
pub const FIELD_ROWS_IN: &str = "rows_in";
pub const FIELD_KEYS_NEW: &str = "keys_new";
pub const FIELD_KEYS_CHANGED: &str = "keys_changed";
pub const FIELD_KEYS_UNCHANGED: &str = "keys_unchanged";
pub const FIELD_KEYS_DELETED: &str = "keys_deleted";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
pub const EVENT_RETRY: &str = "retry";
