//! Historized table access
//!
//! [`HistoryStore`] is the seam between the pure pipeline and whatever holds
//! the historized table. Two implementations exist: [`MemoryHistory`] here
//! and the SQLite store in `scdx-store`.
//!
//! ## Write contract
//!
//! `apply_plan` applies a whole [`WritePlan`] or nothing. Every key write
//! states which current interval it expects (`None` for a new key); if any
//! expectation fails the store returns `WriteConflict` naming the keys and
//! leaves the table untouched.

pub mod memory;
pub mod plan;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::diff::DiffCounts;
use crate::errors::ExError;
use crate::model::HistorizedRecord;

pub use memory::MemoryHistory;
pub use plan::{plan_writes, KeyWrite, WritePlan};

/// Bounds of the latest closed interval of a key with no current interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastClosed {
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

impl LastClosed {
    /// Start of the interval that reopens this key for a row stamped
    /// `updated_at`
    ///
    /// Never before the closure. When the closed interval is empty
    /// (`valid_from == valid_to`) the reopened one starts a microsecond
    /// later, so the two never share a `valid_from` and with it an `scd_id`.
    pub fn reopen_at(&self, updated_at: DateTime<Utc>) -> DateTime<Utc> {
        if updated_at > self.valid_to {
            updated_at
        } else if self.valid_from == self.valid_to {
            self.valid_to + Duration::microseconds(1)
        } else {
            self.valid_to
        }
    }
}

/// What the diff needs to know about the table before a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorState {
    /// Current interval per key
    pub current: BTreeMap<String, HistorizedRecord>,
    /// Latest closed interval per key that has no current interval
    pub last_closed: BTreeMap<String, LastClosed>,
}

impl PriorState {
    /// Derive the prior state from a full history
    pub fn from_history<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a HistorizedRecord>,
    {
        let mut current = BTreeMap::new();
        let mut closed: BTreeMap<String, LastClosed> = BTreeMap::new();
        for row in rows {
            match row.valid_to {
                None => {
                    current.insert(row.key.clone(), row.clone());
                }
                Some(valid_to) => {
                    let bounds = LastClosed {
                        valid_from: row.valid_from,
                        valid_to,
                    };
                    let entry = closed.entry(row.key.clone()).or_insert(bounds);
                    if (valid_to, row.valid_from) > (entry.valid_to, entry.valid_from) {
                        *entry = bounds;
                    }
                }
            }
        }
        closed.retain(|key, _| !current.contains_key(key));
        Self {
            current,
            last_closed: closed,
        }
    }
}

/// Rows touched by an applied plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub opened: usize,
    pub closed: usize,
}

/// Final status of a run as recorded in the run ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Committed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Committed => "committed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "committed" => Some(RunStatus::Committed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One entry of the run ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub target: String,
    pub status: RunStatus,
    pub attempts: u32,
    pub counts: DiffCounts,
    pub error_code: Option<String>,
    /// Natural keys named by the failure, if any
    pub error_keys: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Storage for historized tables
pub trait HistoryStore {
    /// Attribute columns recorded for `target`; `None` while it has no history
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store cannot be read.
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>, ExError>;

    /// Current intervals and last closures of `target`
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store cannot be read.
    fn load_prior(&self, target: &str) -> Result<PriorState, ExError>;

    /// Apply a plan atomically
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` when a key's current interval is not the one the
    /// plan expects, `Persistence` on storage failure. The table is unchanged
    /// on any error.
    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome, ExError>;

    /// Full history of `target`, ordered by key then `valid_from`
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store cannot be read.
    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>, ExError>;

    /// Intervals of `target` that were the truth at `at`
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store cannot be read.
    fn as_of(&self, target: &str, at: DateTime<Utc>) -> Result<Vec<HistorizedRecord>, ExError> {
        Ok(self
            .history(target)?
            .into_iter()
            .filter(|row| row.was_valid_at(at))
            .collect())
    }

    /// Record a finished run; stores without a ledger ignore it
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the ledger cannot be written.
    fn record_run(&self, _record: &RunRecord) -> Result<(), ExError> {
        Ok(())
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for &S {
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>, ExError> {
        (**self).table_columns(target)
    }

    fn load_prior(&self, target: &str) -> Result<PriorState, ExError> {
        (**self).load_prior(target)
    }

    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome, ExError> {
        (**self).apply_plan(plan)
    }

    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>, ExError> {
        (**self).history(target)
    }

    fn as_of(&self, target: &str, at: DateTime<Utc>) -> Result<Vec<HistorizedRecord>, ExError> {
        (**self).as_of(target, at)
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), ExError> {
        (**self).record_run(record)
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Arc<S> {
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>, ExError> {
        (**self).table_columns(target)
    }

    fn load_prior(&self, target: &str) -> Result<PriorState, ExError> {
        (**self).load_prior(target)
    }

    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome, ExError> {
        (**self).apply_plan(plan)
    }

    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>, ExError> {
        (**self).history(target)
    }

    fn as_of(&self, target: &str, at: DateTime<Utc>) -> Result<Vec<HistorizedRecord>, ExError> {
        (**self).as_of(target, at)
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), ExError> {
        (**self).record_run(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NormalizedRecord;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn interval(key: &str, from: u32, to: Option<u32>) -> HistorizedRecord {
        let record = NormalizedRecord {
            key: key.into(),
            updated_at: ts(from),
            attributes: BTreeMap::new(),
            ingest_seq: 0,
        };
        let mut row = HistorizedRecord::open(&record, ts(from));
        row.valid_to = to.map(ts);
        row
    }

    #[test]
    fn test_prior_state_from_history() {
        let rows = vec![
            interval("1", 1, Some(2)),
            interval("1", 2, None),
            interval("2", 1, Some(3)),
            interval("2", 3, Some(5)),
        ];
        let prior = PriorState::from_history(&rows);

        assert_eq!(prior.current.len(), 1);
        assert_eq!(prior.current["1"].valid_from, ts(2));
        assert!(!prior.last_closed.contains_key("1"));
        assert_eq!(prior.last_closed["2"].valid_from, ts(3));
        assert_eq!(prior.last_closed["2"].valid_to, ts(5));
    }

    #[test]
    fn test_reopen_never_precedes_closure() {
        let closed = LastClosed {
            valid_from: ts(1),
            valid_to: ts(3),
        };
        assert_eq!(closed.reopen_at(ts(4)), ts(4));
        assert_eq!(closed.reopen_at(ts(2)), ts(3));
        assert_eq!(closed.reopen_at(ts(3)), ts(3));
    }

    #[test]
    fn test_reopen_after_empty_interval_moves_past_it() {
        let empty = LastClosed {
            valid_from: ts(5),
            valid_to: ts(5),
        };
        let reopened = empty.reopen_at(ts(5));
        assert_eq!(reopened, ts(5) + Duration::microseconds(1));
        assert_ne!(
            crate::model::scd_id("1", reopened),
            crate::model::scd_id("1", empty.valid_from)
        );
        assert_eq!(empty.reopen_at(ts(6)), ts(6));
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [RunStatus::Committed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("running"), None);
    }
}
