//! Write planning
//!
//! Turns a [`SnapshotDiff`] into the per-key writes a store must apply. Each
//! write carries the `scd_id` of the current interval it expects to find,
//! which is what stores compare-and-swap against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::diff::{KeyChange, SnapshotDiff};
use crate::model::HistorizedRecord;

/// Writes for one natural key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyWrite {
    pub key: String,
    /// `scd_id` of the current interval this write expects; `None` means the
    /// key must have no current interval
    pub expected_current: Option<String>,
    /// Close the expected current interval at this instant
    pub close_at: Option<DateTime<Utc>>,
    /// Open this interval as the new current one
    pub open: Option<HistorizedRecord>,
}

/// Everything one run writes to one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritePlan {
    pub target: String,
    pub run_at: DateTime<Utc>,
    /// Attribute columns of the input; recorded as the table's columns
    pub columns: BTreeSet<String>,
    /// One entry per written key, ordered by key
    pub writes: Vec<KeyWrite>,
}

impl WritePlan {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn opens(&self) -> usize {
        self.writes.iter().filter(|w| w.open.is_some()).count()
    }

    pub fn closes(&self) -> usize {
        self.writes.iter().filter(|w| w.close_at.is_some()).count()
    }

    pub fn keys(&self) -> Vec<String> {
        self.writes.iter().map(|w| w.key.clone()).collect()
    }
}

/// Build the write plan for `diff`
pub fn plan_writes(diff: &SnapshotDiff, columns: &BTreeSet<String>) -> WritePlan {
    let writes = diff
        .changes
        .values()
        .filter_map(|change| match change {
            KeyChange::New { record, valid_from } => Some(KeyWrite {
                key: record.key.clone(),
                expected_current: None,
                close_at: None,
                open: Some(HistorizedRecord::open(record, *valid_from)),
            }),
            KeyChange::Changed { prior, record, .. } => Some(KeyWrite {
                key: record.key.clone(),
                expected_current: Some(prior.scd_id.clone()),
                close_at: Some(record.updated_at),
                open: Some(HistorizedRecord::open(record, record.updated_at)),
            }),
            KeyChange::Deleted { prior, closed_at } => Some(KeyWrite {
                key: prior.key.clone(),
                expected_current: Some(prior.scd_id.clone()),
                close_at: Some(*closed_at),
                open: None,
            }),
            KeyChange::Unchanged { .. } => None,
        })
        .collect();

    WritePlan {
        target: diff.target.clone(),
        run_at: diff.run_at,
        columns: columns.clone(),
        writes,
    }
}
