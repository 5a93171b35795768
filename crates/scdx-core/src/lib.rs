//! SCDX Core - pure SCD Type-2 historization kernel
//!
//! This crate provides everything a snapshot run needs short of durable
//! storage and input sources:
//! - Row, record and validity-interval models
//! - Batch normalization (one record per natural key, most recent wins)
//! - Change classification of a batch against the current intervals
//! - Write planning with per-key expectations, and an in-memory store
//! - Data-quality checks and historized-table invariants
//! - The error facility and structured logging shared by every SCDX crate

pub mod config;
pub mod diff;
pub mod errors;
pub mod history;
pub mod logging_facility;
pub mod model;
pub mod normalize;
pub mod quality;

pub use scdx_core_types;

// Re-export commonly used types
pub use config::{RetryPolicy, SnapshotConfig};
pub use diff::{compute_diff, ChangeKind, DiffCounts, KeyChange, SnapshotDiff};
pub use errors::{ExError, ExErrorKind, Result, ScdxError};
pub use history::{
    plan_writes, HistoryStore, LastClosed, MemoryHistory, PriorState, RunRecord, RunStatus, WriteOutcome,
    WritePlan,
};
pub use model::{HistorizedRecord, NormalizedRecord, RawRow};
pub use normalize::{normalize, NormalizedBatch};
pub use quality::{CheckRegistry, CheckReport, CheckSpec, Severity};
