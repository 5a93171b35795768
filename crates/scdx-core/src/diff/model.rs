//! Snapshot diff output types.
//!
//! Collections use `BTreeMap` and sorted `Vec` for deterministic output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{HistorizedRecord, NormalizedRecord};

/// Classification of one natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    New,
    Changed,
    Unchanged,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::New => "NEW",
            ChangeKind::Changed => "CHANGED",
            ChangeKind::Unchanged => "UNCHANGED",
            ChangeKind::Deleted => "DELETED",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified change for one natural key, with what the writer needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyChange {
    /// No current interval: open one at `valid_from`
    New {
        record: NormalizedRecord,
        valid_from: DateTime<Utc>,
    },
    /// Tracked attributes differ from the current interval
    Changed {
        prior: HistorizedRecord,
        record: NormalizedRecord,
        changed_columns: Vec<String>,
    },
    /// Tracked attributes match the current interval
    Unchanged { key: String },
    /// Key absent from the input while hard-delete invalidation is enabled
    Deleted {
        prior: HistorizedRecord,
        closed_at: DateTime<Utc>,
    },
}

impl KeyChange {
    pub fn key(&self) -> &str {
        match self {
            KeyChange::New { record, .. } | KeyChange::Changed { record, .. } => &record.key,
            KeyChange::Unchanged { key } => key,
            KeyChange::Deleted { prior, .. } => &prior.key,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            KeyChange::New { .. } => ChangeKind::New,
            KeyChange::Changed { .. } => ChangeKind::Changed,
            KeyChange::Unchanged { .. } => ChangeKind::Unchanged,
            KeyChange::Deleted { .. } => ChangeKind::Deleted,
        }
    }

    /// Does this change produce any write?
    pub fn writes(&self) -> bool {
        !matches!(self, KeyChange::Unchanged { .. })
    }
}

/// A key whose attributes changed but whose `updated_at` does not advance
/// past the current interval's start; it cannot open a contiguous interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleKey {
    pub key: String,
    pub updated_at: DateTime<Utc>,
    pub current_valid_from: DateTime<Utc>,
}

/// Per-class key counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl DiffCounts {
    /// Keys that will be written
    pub fn writes(&self) -> usize {
        self.new + self.changed + self.deleted
    }
}

/// Classification of every key in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub target: String,
    /// Execution time of the run; used as the deletion-closure time
    pub run_at: DateTime<Utc>,
    /// Columns that took part in change detection, sorted
    pub tracked_columns: Vec<String>,
    /// One entry per classified key, ordered by key
    pub changes: BTreeMap<String, KeyChange>,
    pub stale_keys: Vec<StaleKey>,
}

impl SnapshotDiff {
    pub fn counts(&self) -> DiffCounts {
        let mut counts = DiffCounts::default();
        for change in self.changes.values() {
            match change.kind() {
                ChangeKind::New => counts.new += 1,
                ChangeKind::Changed => counts.changed += 1,
                ChangeKind::Unchanged => counts.unchanged += 1,
                ChangeKind::Deleted => counts.deleted += 1,
            }
        }
        counts
    }

    /// True when the run would write nothing
    pub fn is_noop(&self) -> bool {
        !self.changes.values().any(KeyChange::writes)
    }

    /// Keys of one class, in key order
    pub fn keys_of(&self, kind: ChangeKind) -> Vec<&str> {
        self.changes
            .values()
            .filter(|c| c.kind() == kind)
            .map(KeyChange::key)
            .collect()
    }
}
