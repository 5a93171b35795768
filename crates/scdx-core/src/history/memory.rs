//! In-memory history store
//!
//! Holds every target's intervals behind a single mutex. Plans are applied
//! to a copy of the target's rows and swapped in only when every write
//! succeeded, so a rejected plan leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::{ExError, ExErrorKind, ScdxError};
use crate::history::{HistoryStore, KeyWrite, PriorState, RunRecord, WriteOutcome, WritePlan};
use crate::model::HistorizedRecord;

#[derive(Debug, Clone, Default)]
struct TargetTable {
    columns: BTreeSet<String>,
    rows: Vec<HistorizedRecord>,
}

impl TargetTable {
    fn current_id(&self, key: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.key == key && r.is_current())
            .map(|r| r.scd_id.as_str())
    }

    /// Check every expectation of `plan` without touching the rows
    fn conflicting_keys(&self, plan: &WritePlan) -> Vec<String> {
        plan.writes
            .iter()
            .filter(|w| self.current_id(&w.key) != w.expected_current.as_deref())
            .map(|w| w.key.clone())
            .collect()
    }

    fn apply_write(&mut self, write: &KeyWrite) -> Result<(), ScdxError> {
        if let (Some(expected), Some(close_at)) = (&write.expected_current, write.close_at) {
            let row = self
                .rows
                .iter_mut()
                .find(|r| &r.scd_id == expected && r.is_current())
                .ok_or_else(|| ScdxError::WriteConflict {
                    keys: vec![write.key.clone()],
                })?;
            if close_at < row.valid_from {
                return Err(ScdxError::InvariantViolation {
                    key: write.key.clone(),
                    reason: format!(
                        "closing at {} precedes valid_from {}",
                        close_at, row.valid_from
                    ),
                });
            }
            row.valid_to = Some(close_at);
        }

        if let Some(open) = &write.open {
            if self.rows.iter().any(|r| r.scd_id == open.scd_id) {
                return Err(ScdxError::InvariantViolation {
                    key: write.key.clone(),
                    reason: format!("interval starting at {} already exists", open.valid_from),
                });
            }
            self.rows.push(open.clone());
        }
        Ok(())
    }
}

/// History store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryHistory {
    tables: Mutex<BTreeMap<String, TargetTable>>,
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `target` with existing intervals, replacing whatever it held
    pub fn with_rows(mut self, target: &str, rows: Vec<HistorizedRecord>) -> Self {
        let columns = rows
            .iter()
            .flat_map(|r| r.attributes.keys().cloned())
            .collect();
        self.tables
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.to_string(), TargetTable { columns, rows });
        self
    }

    /// Runs recorded so far, oldest first
    pub fn runs(&self) -> Result<Vec<RunRecord>, ExError> {
        let runs = self.runs.lock().map_err(|_| poisoned("runs"))?;
        Ok(runs.clone())
    }

    fn tables(&self) -> Result<MutexGuard<'_, BTreeMap<String, TargetTable>>, ExError> {
        self.tables.lock().map_err(|_| poisoned("tables"))
    }
}

fn poisoned(what: &str) -> ExError {
    ExError::new(ExErrorKind::Internal).with_message(format!("{} lock poisoned", what))
}

impl HistoryStore for MemoryHistory {
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>, ExError> {
        Ok(self.tables()?.get(target).map(|t| t.columns.clone()))
    }

    fn load_prior(&self, target: &str) -> Result<PriorState, ExError> {
        let tables = self.tables()?;
        Ok(tables
            .get(target)
            .map(|t| PriorState::from_history(&t.rows))
            .unwrap_or_default())
    }

    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome, ExError> {
        let mut tables = self.tables()?;
        let existing = tables.get(&plan.target).cloned().unwrap_or_default();

        let conflicts = existing.conflicting_keys(plan);
        if !conflicts.is_empty() {
            return Err(ExError::from(ScdxError::WriteConflict { keys: conflicts })
                .with_target(&plan.target));
        }

        let mut staged = existing;
        for write in &plan.writes {
            staged
                .apply_write(write)
                .map_err(|e| ExError::from(e).with_target(&plan.target))?;
        }
        staged.columns.extend(plan.columns.iter().cloned());
        tables.insert(plan.target.clone(), staged);

        Ok(WriteOutcome {
            opened: plan.opens(),
            closed: plan.closes(),
        })
    }

    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>, ExError> {
        let tables = self.tables()?;
        let mut rows = tables
            .get(target)
            .map(|t| t.rows.clone())
            .unwrap_or_default();
        rows.sort_by(|a, b| (&a.key, a.valid_from).cmp(&(&b.key, b.valid_from)));
        Ok(rows)
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), ExError> {
        self.runs
            .lock()
            .map_err(|_| poisoned("runs"))?
            .push(record.clone());
        Ok(())
    }
}
