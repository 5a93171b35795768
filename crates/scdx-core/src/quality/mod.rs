//! Data quality
//!
//! Two kinds of checks live here:
//!
//! - [`checks`]: user-configured tests run against a normalized batch before
//!   anything is written (`not_null`, `unique`, `accepted_values`,
//!   `not_empty`, plus whatever a caller registers)
//! - [`invariants`]: structural properties every historized table must hold,
//!   used by tests and by `verify` callers after a run

pub mod checks;
pub mod invariants;

pub use checks::{CheckOutcome, CheckPredicate, CheckRegistry, CheckReport, CheckSpec, Severity};
pub use invariants::{
    find_gaps, find_multiple_current, find_overlaps, verify_contiguity, verify_currency,
    verify_history,
};
