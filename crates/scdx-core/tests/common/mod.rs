use chrono::{DateTime, TimeZone, Utc};
use scdx_core::history::{plan_writes, HistoryStore, MemoryHistory};
use scdx_core::{compute_diff, normalize, ExError, RawRow, SnapshotConfig, SnapshotDiff};
use serde_json::Value;

/// 2024-01-01 at `hour`:00 UTC
#[allow(dead_code)]
pub fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

/// RFC3339 text for `ts(hour)`
#[allow(dead_code)]
pub fn at(hour: u32) -> String {
    ts(hour).to_rfc3339()
}

#[allow(dead_code)]
pub fn customers() -> SnapshotConfig {
    SnapshotConfig::new("dim_customers", "id", "updated_at")
}

/// Run the whole pipeline against an in-memory store
///
/// Normalizes `values`, diffs against the store, and applies the plan.
#[allow(dead_code)]
pub fn snapshot(
    store: &MemoryHistory,
    config: &SnapshotConfig,
    values: Vec<Value>,
    run_at: DateTime<Utc>,
) -> Result<SnapshotDiff, ExError> {
    let rows = RawRow::batch_from_json(values)?;
    let batch = normalize(&rows, config)?;
    let columns = store.table_columns(&config.target)?;
    let prior = store.load_prior(&config.target)?;
    let diff = compute_diff(&batch, &prior, config, columns.as_ref(), run_at)?;
    let plan = plan_writes(&diff, &batch.columns);
    if !plan.is_empty() {
        store.apply_plan(&plan)?;
    }
    Ok(diff)
}
