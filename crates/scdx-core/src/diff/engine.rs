//! Snapshot diff computation engine.
//!
//! The entry point is [`compute_diff`], which classifies every key of a
//! normalized batch against the current intervals of the target table.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::SnapshotConfig;
use crate::diff::model::{KeyChange, SnapshotDiff, StaleKey};
use crate::errors::{Result, ScdxError};
use crate::history::PriorState;
use crate::model::{HistorizedRecord, NormalizedRecord};
use crate::normalize::NormalizedBatch;

/// Resolve the columns that take part in change detection.
///
/// An explicit `tracked_columns` list is used as given. Otherwise every
/// attribute column known to the input or to the table is tracked, except
/// audit columns.
pub fn resolve_tracked_columns(
    config: &SnapshotConfig,
    input_columns: &BTreeSet<String>,
    table_columns: Option<&BTreeSet<String>>,
) -> BTreeSet<String> {
    match &config.tracked_columns {
        Some(explicit) => explicit.iter().cloned().collect(),
        None => input_columns
            .iter()
            .chain(table_columns.into_iter().flatten())
            .filter(|c| !config.is_audit_column(c))
            .cloned()
            .collect(),
    }
}

/// Check that every tracked column exists in the input and in the table.
///
/// The input side is skipped for an empty batch (it carries no schema) and
/// the table side is skipped while the table holds no history yet.
fn check_schema(
    tracked: &BTreeSet<String>,
    batch: &NormalizedBatch,
    table_columns: Option<&BTreeSet<String>>,
) -> Result<()> {
    let missing_in_input: Vec<String> = if batch.is_empty() {
        Vec::new()
    } else {
        tracked.difference(&batch.columns).cloned().collect()
    };
    let missing_in_table: Vec<String> = match table_columns {
        Some(columns) if !columns.is_empty() => tracked.difference(columns).cloned().collect(),
        _ => Vec::new(),
    };

    if missing_in_input.is_empty() && missing_in_table.is_empty() {
        Ok(())
    } else {
        Err(ScdxError::SchemaMismatch {
            missing_in_input,
            missing_in_table,
        })
    }
}

/// Tracked columns whose values differ; absent columns compare as null
fn changed_columns(
    tracked: &BTreeSet<String>,
    record: &NormalizedRecord,
    prior: &HistorizedRecord,
) -> Vec<String> {
    tracked
        .iter()
        .filter(|column| {
            let prior_value = prior
                .attributes
                .get(column.as_str())
                .unwrap_or(&serde_json::Value::Null);
            record.attribute(column) != prior_value
        })
        .cloned()
        .collect()
}

/// Classify every key of `batch` against the prior current intervals.
///
/// Pure: reads its inputs and returns the classification. Keys present in
/// `prior` but absent from `batch` are classified `Deleted` only when
/// `config.invalidate_hard_deletes` is set; otherwise they are left alone.
///
/// # Errors
///
/// Returns `SchemaMismatch` if a tracked column is absent from the input or
/// from the table's recorded columns.
pub fn compute_diff(
    batch: &NormalizedBatch,
    prior: &PriorState,
    config: &SnapshotConfig,
    table_columns: Option<&BTreeSet<String>>,
    run_at: DateTime<Utc>,
) -> Result<SnapshotDiff> {
    let tracked = resolve_tracked_columns(config, &batch.columns, table_columns);
    check_schema(&tracked, batch, table_columns)?;

    let mut changes = BTreeMap::new();
    let mut stale_keys = Vec::new();

    for record in batch.iter() {
        let change = match prior.current.get(&record.key) {
            None => {
                let valid_from = match prior.last_closed.get(&record.key) {
                    Some(closed) => closed.reopen_at(record.updated_at),
                    None => record.updated_at,
                };
                KeyChange::New {
                    record: record.clone(),
                    valid_from,
                }
            }
            Some(current) => {
                let changed = changed_columns(&tracked, record, current);
                if changed.is_empty() {
                    KeyChange::Unchanged {
                        key: record.key.clone(),
                    }
                } else if record.updated_at <= current.valid_from {
                    tracing::warn!(
                        target_table = %config.target,
                        natural_key = %record.key,
                        updated_at = %record.updated_at,
                        current_valid_from = %current.valid_from,
                        "Changed row does not advance updated_at; ignoring"
                    );
                    stale_keys.push(StaleKey {
                        key: record.key.clone(),
                        updated_at: record.updated_at,
                        current_valid_from: current.valid_from,
                    });
                    KeyChange::Unchanged {
                        key: record.key.clone(),
                    }
                } else {
                    KeyChange::Changed {
                        prior: current.clone(),
                        record: record.clone(),
                        changed_columns: changed,
                    }
                }
            }
        };
        changes.insert(record.key.clone(), change);
    }

    if config.invalidate_hard_deletes {
        for (key, current) in &prior.current {
            if batch.get(key).is_none() {
                let closed_at = run_at.max(current.valid_from);
                changes.insert(
                    key.clone(),
                    KeyChange::Deleted {
                        prior: current.clone(),
                        closed_at,
                    },
                );
            }
        }
    }

    Ok(SnapshotDiff {
        target: config.target.clone(),
        run_at,
        tracked_columns: tracked.into_iter().collect(),
        changes,
        stale_keys,
    })
}
