//! Run ledger persistence
//!
//! One row per finished run in the `runs` table. Instants are stored as
//! microseconds since the epoch like the history table.

use rusqlite::Connection;
use scdx_core::diff::DiffCounts;
use scdx_core::errors::{ExError, ExErrorKind};
use scdx_core::history::{RunRecord, RunStatus};

use crate::errors::{corrupt_row, from_rusqlite, Result};
use crate::history::codec::{from_micros, to_micros};

/// Insert a run ledger entry
///
/// # Errors
///
/// Returns `Persistence` if the insert fails (including a duplicate run id).
pub fn insert_run(conn: &Connection, record: &RunRecord) -> Result<()> {
    let error_keys = serde_json::to_string(&record.error_keys).map_err(|e| {
        ExError::new(ExErrorKind::Serialization)
            .with_op("insert_run")
            .with_message(e.to_string())
    })?;

    conn.execute(
        r#"
        INSERT INTO runs (
            run_id, target, status, attempts,
            keys_new, keys_changed, keys_unchanged, keys_deleted,
            error_code, error_keys, started_at, finished_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        rusqlite::params![
            record.run_id,
            record.target,
            record.status.as_str(),
            record.attempts,
            record.counts.new as i64,
            record.counts.changed as i64,
            record.counts.unchanged as i64,
            record.counts.deleted as i64,
            record.error_code,
            error_keys,
            to_micros(record.started_at),
            to_micros(record.finished_at),
        ],
    )
    .map_err(from_rusqlite)?;

    tracing::debug!(
        run_id = %record.run_id,
        target_table = %record.target,
        status = record.status.as_str(),
        "Recorded run"
    );
    Ok(())
}

struct StoredRun {
    run_id: String,
    target: String,
    status: String,
    attempts: u32,
    counts: [i64; 4],
    error_code: Option<String>,
    error_keys: String,
    started_at: i64,
    finished_at: i64,
}

/// List ledger entries oldest first, optionally for one target
///
/// # Errors
///
/// Returns `Persistence` on query failure, `Serialization` for rows no
/// writer produces.
pub fn list_runs(conn: &Connection, target: Option<&str>) -> Result<Vec<RunRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, target, status, attempts,
                    keys_new, keys_changed, keys_unchanged, keys_deleted,
                    error_code, error_keys, started_at, finished_at
             FROM runs
             WHERE ?1 IS NULL OR target = ?1
             ORDER BY started_at, run_id",
        )
        .map_err(from_rusqlite)?;

    let stored = stmt
        .query_map([target], |row| {
            Ok(StoredRun {
                run_id: row.get(0)?,
                target: row.get(1)?,
                status: row.get(2)?,
                attempts: row.get(3)?,
                counts: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
                error_code: row.get(8)?,
                error_keys: row.get(9)?,
                started_at: row.get(10)?,
                finished_at: row.get(11)?,
            })
        })
        .map_err(from_rusqlite)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(from_rusqlite)?;

    stored.into_iter().map(decode_run).collect()
}

fn decode_run(run: StoredRun) -> Result<RunRecord> {
    let status = RunStatus::parse(&run.status)
        .ok_or_else(|| corrupt_row(&run.target, &format!("unknown run status {}", run.status)))?;
    let error_keys: Vec<String> = serde_json::from_str(&run.error_keys)
        .map_err(|e| corrupt_row(&run.target, &format!("bad error_keys: {}", e)))?;
    let [new, changed, unchanged, deleted] = run.counts.map(|c| usize::try_from(c).unwrap_or(0));

    Ok(RunRecord {
        started_at: from_micros(&run.target, run.started_at)?,
        finished_at: from_micros(&run.target, run.finished_at)?,
        run_id: run.run_id,
        target: run.target,
        status,
        attempts: run.attempts,
        counts: DiffCounts {
            new,
            changed,
            unchanged,
            deleted,
        },
        error_code: run.error_code,
        error_keys,
    })
}
