//! Snapshot run orchestration
//!
//! [`SnapshotRunner`](runner::SnapshotRunner) drives one historization run
//! per call: normalize the input, evaluate checks, diff against the stored
//! history, and apply the resulting plan, retrying the whole cycle when
//! another writer moved a key's current interval underneath it.

pub mod runner;

pub use runner::report::RunReport;
pub use runner::state::{RunPhase, RunState};
pub use runner::{RunOptions, SnapshotRunner};
