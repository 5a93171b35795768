//! Report returned by a finished run

use serde::Serialize;

use scdx_core::diff::human_summary::render_human_summary;
use scdx_core::diff::{DiffCounts, SnapshotDiff, StaleKey};
use scdx_core::history::WriteOutcome;
use scdx_core::quality::CheckReport;
use scdx_core_types::RunId;

use crate::runner::state::RunPhase;

/// Outcome of one successful snapshot run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub target: String,
    /// Whole normalize-diff-write cycles attempted, including the final one
    pub attempts: u32,
    /// True when nothing was written by request
    pub dry_run: bool,
    /// Raw rows read
    pub rows_in: usize,
    /// Rows dropped because a more recent row shared their key
    pub superseded: usize,
    /// Classification from the attempt that committed
    pub diff: SnapshotDiff,
    pub outcome: WriteOutcome,
    pub checks: CheckReport,
    /// Phases the run passed through
    pub phases: Vec<RunPhase>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn counts(&self) -> DiffCounts {
        self.diff.counts()
    }

    pub fn stale_keys(&self) -> &[StaleKey] {
        &self.diff.stale_keys
    }

    /// Rows opened or closed by this run
    pub fn writes(&self) -> usize {
        self.outcome.opened + self.outcome.closed
    }

    /// Markdown summary for humans; the structured fields stay authoritative
    pub fn summary(&self) -> String {
        let mut out = render_human_summary(&self.diff);
        out.push_str(&format!(
            "\n**Run**: `{}`  \n**Attempts**: {}  \n**Rows in**: {} ({} superseded)  \n**Opened/closed**: {}/{}\n",
            self.run_id,
            self.attempts,
            self.rows_in,
            self.superseded,
            self.outcome.opened,
            self.outcome.closed,
        ));
        if self.dry_run {
            out.push_str("\n_Dry run: nothing was written._\n");
        }
        let failing: Vec<_> = self.checks.failures().collect();
        if !failing.is_empty() {
            out.push_str("\n### Check warnings\n\n");
            for outcome in failing {
                out.push_str(&format!(
                    "- `{}`: {} failing\n",
                    outcome.check,
                    outcome.failing.len()
                ));
            }
        }
        out
    }
}
