//! Snapshot diff engine.
//!
//! Classifies each natural key of a normalized batch against the target's
//! current intervals as `NEW`, `CHANGED`, `UNCHANGED` or `DELETED`.
//!
//! ## Entry point
//!
//! ```ignore
//! use scdx_core::diff::compute_diff;
//!
//! let diff = compute_diff(&batch, &prior, &config, table_columns.as_ref(), run_at)?;
//! let summary = scdx_core::diff::render_human_summary(&diff);
//! ```
//!
//! ## Guarantees
//!
//! - **Purity**: no side effects; the writer consumes the result.
//! - **Determinism**: identical inputs produce identical diffs (key-ordered).
//! - **No no-op intervals**: attribute-identical keys are always `UNCHANGED`.

pub mod engine;
pub mod human_summary;
pub mod model;

pub use engine::{compute_diff, resolve_tracked_columns};
pub use human_summary::render_human_summary;
pub use model::{ChangeKind, DiffCounts, KeyChange, SnapshotDiff, StaleKey};
