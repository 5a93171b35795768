use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use scdx_core::history::{HistoryStore, PriorState, RunRecord, WriteOutcome, WritePlan};
use scdx_core::{ExError, HistorizedRecord, RawRow, SnapshotConfig};
use scdx_engine::SnapshotRunner;
use scdx_store::SqliteHistoryStore;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tempfile::TempDir;

/// 2024-01-01 at `hour`:00 UTC
#[allow(dead_code)]
pub fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn at(hour: u32) -> String {
    ts(hour).to_rfc3339()
}

#[allow(dead_code)]
pub fn customers() -> SnapshotConfig {
    SnapshotConfig::new("dim_customers", "id", "updated_at")
}

#[allow(dead_code)]
pub fn rows(values: Vec<Value>) -> Vec<RawRow> {
    RawRow::batch_from_json(values).unwrap()
}

#[allow(dead_code)]
pub fn customer(id: i64, name: &str, hour: u32) -> Value {
    json!({"id": id, "name": name, "updated_at": at(hour)})
}

/// A fresh on-disk database; keep the TempDir alive for the test's duration
#[allow(dead_code)]
pub fn setup() -> (TempDir, PathBuf, SqliteHistoryStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");
    let store = SqliteHistoryStore::open(&path).unwrap();
    (dir, path, store)
}

/// Runner whose clock always reads `hour`
#[allow(dead_code)]
pub fn runner_at<S: HistoryStore>(store: S, hour: u32) -> SnapshotRunner<S> {
    SnapshotRunner::new(store).with_clock(move || ts(hour))
}

/// Wraps a store and lets a competing writer commit just before the first
/// `n` plans are applied, so those applies hit a write conflict
#[allow(dead_code)]
pub struct InterferingStore<S: HistoryStore> {
    pub inner: S,
    competitor: Mutex<Vec<WritePlan>>,
    pub applies: AtomicUsize,
}

#[allow(dead_code)]
impl<S: HistoryStore> InterferingStore<S> {
    /// Each of `competitor` is applied straight to `inner` ahead of one of
    /// the wrapped applies, in order
    pub fn new(inner: S, competitor: Vec<WritePlan>) -> Self {
        Self {
            inner,
            competitor: Mutex::new(competitor),
            applies: AtomicUsize::new(0),
        }
    }
}

impl<S: HistoryStore> HistoryStore for InterferingStore<S> {
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>, ExError> {
        self.inner.table_columns(target)
    }

    fn load_prior(&self, target: &str) -> Result<PriorState, ExError> {
        self.inner.load_prior(target)
    }

    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome, ExError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut pending = self.competitor.lock().unwrap();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };
        if let Some(competing) = next {
            self.inner.apply_plan(&competing).unwrap();
        }
        self.inner.apply_plan(plan)
    }

    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>, ExError> {
        self.inner.history(target)
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), ExError> {
        self.inner.record_run(record)
    }
}

/// Wraps a store and parks every apply until the test releases it
#[allow(dead_code)]
pub struct GatedStore<S: HistoryStore> {
    pub inner: S,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

#[allow(dead_code)]
impl<S: HistoryStore> GatedStore<S> {
    pub fn new(inner: S, entered: Sender<()>, release: Receiver<()>) -> Self {
        Self {
            inner,
            entered: Mutex::new(entered),
            release: Mutex::new(release),
        }
    }
}

impl<S: HistoryStore> HistoryStore for GatedStore<S> {
    fn table_columns(&self, target: &str) -> Result<Option<BTreeSet<String>>, ExError> {
        self.inner.table_columns(target)
    }

    fn load_prior(&self, target: &str) -> Result<PriorState, ExError> {
        self.inner.load_prior(target)
    }

    fn apply_plan(&self, plan: &WritePlan) -> Result<WriteOutcome, ExError> {
        self.entered.lock().unwrap().send(()).unwrap();
        self.release.lock().unwrap().recv().unwrap();
        self.inner.apply_plan(plan)
    }

    fn history(&self, target: &str) -> Result<Vec<HistorizedRecord>, ExError> {
        self.inner.history(target)
    }

    fn record_run(&self, record: &RunRecord) -> Result<(), ExError> {
        self.inner.record_run(record)
    }
}

/// The plan a separate writer would apply for `values` against `store`'s
/// current state
#[allow(dead_code)]
pub fn competing_plan<S: HistoryStore>(
    store: &S,
    config: &SnapshotConfig,
    values: Vec<Value>,
    run_at: DateTime<Utc>,
) -> WritePlan {
    let batch = scdx_core::normalize(&rows(values), config).unwrap();
    let columns = store.table_columns(&config.target).unwrap();
    let prior = store.load_prior(&config.target).unwrap();
    let diff =
        scdx_core::compute_diff(&batch, &prior, config, columns.as_ref(), run_at).unwrap();
    scdx_core::history::plan_writes(&diff, &batch.columns)
}
