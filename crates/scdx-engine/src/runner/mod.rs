//! Snapshot run orchestration.
//!
//! ## Run pipeline (in order):
//! 1. Validate the snapshot config (no writes on failure)
//! 2. Register the run for its target; refused while another run of the
//!    same target is writing
//! 3. Normalize the raw batch (all malformed rows reported together)
//! 4. Evaluate data-quality checks; an error-severity failure aborts
//! 5. Load prior state and the table's columns, compute the diff
//! 6. dry_run short-circuit (no writes, no ledger entry)
//! 7. Apply the write plan; a write conflict restarts from step 5 with
//!    backoff until `retry.max_attempts` is spent
//! 8. Record the run in the store's ledger
//!
//! Steps 1-7 either commit the whole plan or leave the table untouched.

#![allow(clippy::result_large_err)]

pub mod report;
pub mod state;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};

use scdx_core::errors::{ExError, ExErrorKind};
use scdx_core::history::{plan_writes, HistoryStore, RunRecord, RunStatus, WriteOutcome};
use scdx_core::model::truncate_micros;
use scdx_core::normalize::NormalizedBatch;
use scdx_core::quality::{verify_history, CheckRegistry, CheckReport};
use scdx_core::{compute_diff, log_op_end, log_op_error, log_op_start, normalize};
use scdx_core::{DiffCounts, RawRow, SnapshotConfig, SnapshotDiff};
use scdx_core_types::schema::EVENT_RETRY;
use scdx_core_types::{RunContext, RunId, TraceId};
use scdx_store::RowSource;

use report::RunReport;
use state::{RunPhase, RunState};

const OP_RUN: &str = "snapshot_run";

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type ActiveRuns = HashMap<String, BTreeMap<RunId, RunPhase>>;

/// Options for a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Normalize, check and diff, but write nothing and skip the ledger
    pub dry_run: bool,
    /// Caller's trace to attach to logs and errors
    pub trace_id: Option<TraceId>,
}

/// Attempts and counts accumulated while a run executes; recorded in the
/// ledger whether or not the run succeeds
#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    counts: DiffCounts,
}

/// Runs snapshots against one history store
///
/// Shareable across threads. Runs of different targets are independent;
/// runs of one target serialize through the store's compare-and-swap.
pub struct SnapshotRunner<S: HistoryStore> {
    store: S,
    checks: CheckRegistry,
    clock: Clock,
    active: Mutex<ActiveRuns>,
}

impl<S: HistoryStore> std::fmt::Debug for SnapshotRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRunner")
            .field("checks", &self.checks)
            .finish_non_exhaustive()
    }
}

/// Registration of one live run; removed from the registry when dropped
#[derive(Debug)]
struct ActiveRun<'a> {
    registry: &'a Mutex<ActiveRuns>,
    target: String,
    run_id: RunId,
}

impl ActiveRun<'_> {
    fn set(&self, phase: RunPhase) -> Result<(), ExError> {
        let mut runs = lock_registry(self.registry)?;
        runs.entry(self.target.clone())
            .or_default()
            .insert(self.run_id.clone(), phase);
        Ok(())
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Ok(mut runs) = self.registry.lock() {
            if let Some(target_runs) = runs.get_mut(&self.target) {
                target_runs.remove(&self.run_id);
                if target_runs.is_empty() {
                    runs.remove(&self.target);
                }
            }
        }
    }
}

fn lock_registry(registry: &Mutex<ActiveRuns>) -> Result<MutexGuard<'_, ActiveRuns>, ExError> {
    registry.lock().map_err(|_| {
        ExError::new(ExErrorKind::Internal)
            .with_op(OP_RUN)
            .with_message("run registry lock poisoned")
    })
}

impl<S: HistoryStore> SnapshotRunner<S> {
    /// Runner with the built-in checks and the system clock
    pub fn new(store: S) -> Self {
        Self {
            store,
            checks: CheckRegistry::with_builtins(),
            clock: Box::new(Utc::now),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the check registry
    pub fn with_checks(mut self, checks: CheckRegistry) -> Self {
        self.checks = checks;
        self
    }

    /// Replace the clock that stamps run execution time
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Phases of the runs currently live for `target`
    pub fn active_phases(&self, target: &str) -> Vec<RunPhase> {
        self.active
            .lock()
            .map(|runs| {
                runs.get(target)
                    .map(|r| r.values().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Historize one raw batch into `config.target`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig`, `Validation`, `CheckFailed` or
    /// `SchemaMismatch` before anything is written; `RunInProgress` when
    /// another run of the target is writing; `WriteConflict` once retries
    /// are spent; `Persistence` on storage failure. Every error carries the
    /// run id and target.
    pub fn run(&self, config: &SnapshotConfig, rows: &[RawRow]) -> Result<RunReport, ExError> {
        self.run_with(config, rows, RunOptions::default())
    }

    /// Read the batch from `source`, then [`run`](Self::run) it
    ///
    /// # Errors
    ///
    /// Returns the source's read error, or any error of [`run`](Self::run).
    pub fn run_source(
        &self,
        config: &SnapshotConfig,
        source: &dyn RowSource,
    ) -> Result<RunReport, ExError> {
        tracing::debug!(target = %config.target, source = %source.describe(), "Reading batch");
        let rows = source
            .read()
            .map_err(|e| e.with_target(config.target.clone()))?;
        self.run(config, &rows)
    }

    /// [`run`](Self::run) with explicit options
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run).
    pub fn run_with(
        &self,
        config: &SnapshotConfig,
        rows: &[RawRow],
        options: RunOptions,
    ) -> Result<RunReport, ExError> {
        let mut ctx = RunContext::new(config.target.clone());
        if let Some(trace_id) = &options.trace_id {
            ctx = ctx.with_trace_id(trace_id.clone());
        }
        let run_at = truncate_micros((self.clock)());
        let timer = Instant::now();

        log_op_start!(
            OP_RUN,
            run_id = %ctx.run_id,
            target = %ctx.target,
            rows_in = rows.len(),
            dry_run = options.dry_run
        );

        let mut state = RunState::new();
        let mut progress = Progress::default();
        let result = self.execute(&ctx, config, rows, &options, run_at, &mut state, &mut progress);
        let duration_ms = u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(mut report) => {
                report.phases = state.visited().to_vec();
                report.duration_ms = duration_ms;
                if !options.dry_run {
                    self.record(&ctx, RunStatus::Committed, &progress, None, run_at);
                }
                let counts = report.counts();
                log_op_end!(
                    OP_RUN,
                    duration_ms = duration_ms,
                    run_id = %ctx.run_id,
                    target = %ctx.target,
                    attempts = report.attempts,
                    keys_new = counts.new,
                    keys_changed = counts.changed,
                    keys_unchanged = counts.unchanged,
                    keys_deleted = counts.deleted
                );
                Ok(report)
            }
            Err(err) => {
                state.fail();
                let err = contextualize(err, &ctx);
                // A refused run never started, so it has nothing to record
                if err.kind() != ExErrorKind::RunInProgress {
                    self.record(&ctx, RunStatus::Failed, &progress, Some(&err), run_at);
                }
                log_op_error!(
                    OP_RUN,
                    err.clone(),
                    duration_ms = duration_ms,
                    run_id = %ctx.run_id,
                    target = %ctx.target,
                    attempts = progress.attempts
                );
                Err(err)
            }
        }
    }

    /// Check the stored history of `target` for overlapping, multiply-open
    /// or (unless `allow_gaps`) gapped intervals
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` naming the first offending key, or the
    /// store's read error.
    pub fn verify(&self, target: &str, allow_gaps: bool) -> Result<(), ExError> {
        let rows = self.store.history(target)?;
        verify_history(&rows, allow_gaps)
            .map_err(|e| ExError::from(e).with_op("verify_history").with_target(target))
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        ctx: &RunContext,
        config: &SnapshotConfig,
        rows: &[RawRow],
        options: &RunOptions,
        run_at: DateTime<Utc>,
        state: &mut RunState,
        progress: &mut Progress,
    ) -> Result<RunReport, ExError> {
        config.validate()?;
        let registration = self.register(ctx)?;

        enter(state, &registration, RunPhase::Normalizing)?;
        let batch = normalize(rows, config)?;
        let checks = self.checks.evaluate(&batch, &config.checks)?;
        if let Some(err) = checks.blocking() {
            return Err(err);
        }

        enter(state, &registration, RunPhase::Diffing)?;
        loop {
            progress.attempts += 1;
            let columns = self.store.table_columns(&config.target)?;
            let prior = self.store.load_prior(&config.target)?;
            let diff = compute_diff(&batch, &prior, config, columns.as_ref(), run_at)?;
            progress.counts = diff.counts();

            if options.dry_run {
                enter(state, &registration, RunPhase::Idle)?;
                return Ok(build_report(
                    ctx,
                    progress,
                    &batch,
                    diff,
                    WriteOutcome::default(),
                    checks,
                    true,
                ));
            }

            enter(state, &registration, RunPhase::Writing)?;
            let plan = plan_writes(&diff, &batch.columns);
            let applied = if plan.is_empty() {
                Ok(WriteOutcome::default())
            } else {
                self.store.apply_plan(&plan)
            };

            match applied {
                Ok(outcome) => {
                    enter(state, &registration, RunPhase::Idle)?;
                    return Ok(build_report(
                        ctx, progress, &batch, diff, outcome, checks, false,
                    ));
                }
                Err(err)
                    if err.kind().is_retryable()
                        && progress.attempts < config.retry.max_attempts =>
                {
                    let backoff = config.retry.backoff(progress.attempts);
                    tracing::warn!(
                        component = module_path!(),
                        op = OP_RUN,
                        event = EVENT_RETRY,
                        run_id = %ctx.run_id,
                        target = %ctx.target,
                        attempt = progress.attempts,
                        keys = ?err.keys(),
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Write conflict, retrying run"
                    );
                    // Nothing is written while backing off
                    enter(state, &registration, RunPhase::Diffing)?;
                    thread::sleep(backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn register(&self, ctx: &RunContext) -> Result<ActiveRun<'_>, ExError> {
        let mut runs = lock_registry(&self.active)?;
        let target_runs = runs.entry(ctx.target.clone()).or_default();
        if let Some((writer, _)) = target_runs
            .iter()
            .find(|(_, phase)| **phase == RunPhase::Writing)
        {
            return Err(ExError::new(ExErrorKind::RunInProgress)
                .with_op(OP_RUN)
                .with_message(format!("run {} is writing this target", writer)));
        }
        target_runs.insert(ctx.run_id.clone(), RunPhase::Idle);
        Ok(ActiveRun {
            registry: &self.active,
            target: ctx.target.clone(),
            run_id: ctx.run_id.clone(),
        })
    }

    fn record(
        &self,
        ctx: &RunContext,
        status: RunStatus,
        progress: &Progress,
        error: Option<&ExError>,
        started_at: DateTime<Utc>,
    ) {
        let record = RunRecord {
            run_id: ctx.run_id.to_string(),
            target: ctx.target.clone(),
            status,
            attempts: progress.attempts,
            counts: progress.counts,
            error_code: error.map(|e| e.code().to_string()),
            error_keys: error.map(|e| e.keys().to_vec()).unwrap_or_default(),
            started_at,
            finished_at: truncate_micros((self.clock)()).max(started_at),
        };
        if let Err(err) = self.store.record_run(&record) {
            tracing::warn!(
                run_id = %ctx.run_id,
                target = %ctx.target,
                err.code = err.code(),
                "Run could not be recorded in the ledger: {}",
                err
            );
        }
    }
}

fn enter(
    state: &mut RunState,
    registration: &ActiveRun<'_>,
    phase: RunPhase,
) -> Result<(), ExError> {
    state.advance(phase)?;
    registration.set(phase)?;
    tracing::debug!(
        run_id = %registration.run_id,
        target = %registration.target,
        phase = %phase,
        "Run phase"
    );
    Ok(())
}

fn build_report(
    ctx: &RunContext,
    progress: &Progress,
    batch: &NormalizedBatch,
    diff: SnapshotDiff,
    outcome: WriteOutcome,
    checks: CheckReport,
    dry_run: bool,
) -> RunReport {
    RunReport {
        run_id: ctx.run_id.clone(),
        target: ctx.target.clone(),
        attempts: progress.attempts,
        dry_run,
        rows_in: batch.rows_in,
        superseded: batch.superseded,
        diff,
        outcome,
        checks,
        phases: Vec::new(),
        duration_ms: 0,
    }
}

/// Attach the run's identity to an error raised anywhere below the runner
fn contextualize(err: ExError, ctx: &RunContext) -> ExError {
    let mut err = err;
    if err.run_id().is_none() {
        err = err.with_run_id(ctx.run_id.clone());
    }
    if err.target().is_none() {
        err = err.with_target(ctx.target.clone());
    }
    if let (None, Some(trace_id)) = (err.trace_id(), &ctx.trace_id) {
        err = err.with_trace_id(trace_id.clone());
    }
    err
}
