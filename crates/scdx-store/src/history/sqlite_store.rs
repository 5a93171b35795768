use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use scdx_core::errors::{ExError, ExErrorKind, ScdxError};
use scdx_core::history::{
    HistoryStore, KeyWrite, LastClosed, PriorState, RunRecord, WriteOutcome, WritePlan,
};
use scdx_core::model::HistorizedRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{from_rusqlite, write_lock_error, Result};
use crate::history::codec::{
    decode_row, encode_attributes, from_micros, to_micros, StoredRow, HISTORY_COLUMNS,
};
use crate::{db, ledger, migrations};

/// `HistoryStore` backed by one SQLite database
///
/// Several stores (in one process or many) may point at the same file;
/// writes serialize on SQLite's write lock and every key write is checked
/// against the current interval inside the writing transaction.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore").finish_non_exhaustive()
    }
}

impl SqliteHistoryStore {
    /// Open (creating if needed) and migrate the database at `path`
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the file cannot be opened or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = db::open(path)?;
        Self::from_connection(conn)
    }

    /// Fresh in-memory database
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(db::open_in_memory()?)
    }

    /// Configure and migrate an existing connection
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if configuration or migrations fail.
    pub fn from_connection(mut conn: Connection) -> Result<Self> {
        db::configure(&conn)?;
        migrations::apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ledger entries, oldest first, optionally for one target
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the ledger cannot be read.
    pub fn runs(&self, target: Option<&str>) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        ledger::list_runs(&conn, target)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            ExError::new(ExErrorKind::Internal).with_message("sqlite connection lock poisoned")
        })
    }

    fn query_history(
        conn: &Connection,
        target: &str,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<HistorizedRecord>> {
        let sql = format!(
            "SELECT {} FROM history WHERE target = ?1 {} ORDER BY natural_key, valid_from",
            HISTORY_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql).map_err(from_rusqlite)?;
        let mut all: Vec<&dyn rusqlite::ToSql> = vec![&target];
        all.extend_from_slice(params);

        let stored = stmt
            .query_map(all.as_slice(), StoredRow::read)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;

        stored.into_iter().map(|row| decode_row(target, row)).collect()
    }
}

fn current_id(conn: &Connection, target: &str, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT scd_id FROM history WHERE target = ?1 AND natural_key = ?2 AND valid_to IS NULL",
        rusqlite::params![target, key],
        |row| row.get(0),
    )
    .optional()
    .map_err(from_rusqlite)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Apply one key's close and open; expectations were checked beforehand
fn apply_write(conn: &Connection, target: &str, write: &KeyWrite) -> Result<()> {
    let conflict = || -> ExError {
        ExError::from(ScdxError::WriteConflict {
            keys: vec![write.key.clone()],
        })
        .with_target(target)
    };

    if let (Some(expected), Some(close_at)) = (&write.expected_current, write.close_at) {
        let updated = conn
            .execute(
                "UPDATE history SET valid_to = ?1
                 WHERE target = ?2 AND scd_id = ?3 AND valid_to IS NULL",
                rusqlite::params![to_micros(close_at), target, expected],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    ExError::from(ScdxError::InvariantViolation {
                        key: write.key.clone(),
                        reason: format!("closing at {} precedes valid_from", close_at),
                    })
                    .with_target(target)
                } else {
                    from_rusqlite(e)
                }
            })?;
        if updated != 1 {
            return Err(conflict());
        }
    }

    if let Some(open) = &write.open {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM history WHERE target = ?1 AND scd_id = ?2",
                rusqlite::params![target, open.scd_id],
                |_| Ok(true),
            )
            .optional()
            .map_err(from_rusqlite)?
            .unwrap_or(false);
        if exists {
            return Err(ExError::from(ScdxError::InvariantViolation {
                key: write.key.clone(),
                reason: format!("interval starting at {} already exists", open.valid_from),
            })
            .with_target(target));
        }

        conn.execute(
            "INSERT INTO history
                (target, scd_id, natural_key, attributes, updated_at, valid_from, valid_to)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            rusqlite::params![
                target,
                open.scd_id,
                open.key,
                encode_attributes(&open.attributes)?,
                to_micros(open.updated_at),
                to_micros(open.valid_from),
            ],
        )
        .map_err(|e| {
            // The partial unique index rejects a second current interval
            if is_constraint_violation(&e) {
                conflict()
            } else {
                from_rusqlite(e)
            }
        })?;
    }

    Ok(())
}

impl HistoryStore for SqliteHistoryStore {
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT column_name FROM target_columns WHERE target = ?1")
            .map_err(from_rusqlite)?;
        let columns: BTreeSet<String> = stmt
            .query_map([target], |row| row.get(0))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<_, _>>()
            .map_err(from_rusqlite)?;

        Ok(if columns.is_empty() {
            None
        } else {
            Some(columns)
        })
    }

    fn load_prior(&self, target: &str) -> Result<PriorState> {
        let conn = self.lock()?;
        let current: BTreeMap<String, HistorizedRecord> =
            Self::query_history(&conn, target, "AND valid_to IS NULL", &[])?
                .into_iter()
                .map(|row| (row.key.clone(), row))
                .collect();

        // Closed intervals of a key never overlap, so the latest one holds
        // both the greatest valid_to and the greatest valid_from
        let mut stmt = conn
            .prepare(
                "SELECT natural_key, MAX(valid_from), MAX(valid_to) FROM history h
                 WHERE h.target = ?1 AND h.valid_to IS NOT NULL
                   AND NOT EXISTS (
                       SELECT 1 FROM history c
                       WHERE c.target = h.target AND c.natural_key = h.natural_key
                         AND c.valid_to IS NULL)
                 GROUP BY natural_key",
            )
            .map_err(from_rusqlite)?;
        let closed: Vec<(String, i64, i64)> = stmt
            .query_map([target], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<_, _>>()
            .map_err(from_rusqlite)?;

        let last_closed = closed
            .into_iter()
            .map(|(key, from, to)| -> Result<(String, LastClosed)> {
                let bounds = LastClosed {
                    valid_from: from_micros(target, from)?,
                    valid_to: from_micros(target, to)?,
                };
                Ok((key, bounds))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(PriorState {
            current,
            last_closed,
        })
    }

    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome> {
        let mut conn = self.lock()?;
        // Take the write lock up front so the expectation checks and the
        // writes see the same table
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                write_lock_error(&plan.target, plan.writes.iter().map(|w| w.key.clone()), e)
            })?;

        let mut conflicts = Vec::new();
        for write in &plan.writes {
            let current = current_id(&tx, &plan.target, &write.key)?;
            if current.as_deref() != write.expected_current.as_deref() {
                conflicts.push(write.key.clone());
            }
        }
        if !conflicts.is_empty() {
            return Err(ExError::from(ScdxError::WriteConflict { keys: conflicts })
                .with_target(&plan.target));
        }

        for write in &plan.writes {
            apply_write(&tx, &plan.target, write)?;
        }

        for column in &plan.columns {
            tx.execute(
                "INSERT OR IGNORE INTO target_columns (target, column_name) VALUES (?1, ?2)",
                rusqlite::params![plan.target, column],
            )
            .map_err(from_rusqlite)?;
        }

        tx.commit().map_err(from_rusqlite)?;

        let outcome = WriteOutcome {
            opened: plan.opens(),
            closed: plan.closes(),
        };
        tracing::debug!(
            target_table = %plan.target,
            opened = outcome.opened,
            closed = outcome.closed,
            "Applied write plan"
        );
        Ok(outcome)
    }

    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>> {
        let conn = self.lock()?;
        Self::query_history(&conn, target, "", &[])
    }

    fn as_of(&self, target: &str, at: DateTime<Utc>) -> Result<Vec<HistorizedRecord>> {
        let conn = self.lock()?;
        let at = to_micros(at);
        Self::query_history(
            &conn,
            target,
            "AND valid_from <= ?2 AND (valid_to IS NULL OR valid_to > ?2)",
            &[&at],
        )
    }

    fn record_run(&self, record: &RunRecord) -> Result<()> {
        let conn = self.lock()?;
        ledger::insert_run(&conn, record)
    }
}
