//! Human-readable summary renderer for snapshot diffs.

use crate::diff::model::{ChangeKind, KeyChange, SnapshotDiff};

/// Keys listed per class before the list is truncated
const MAX_LISTED_KEYS: usize = 20;

/// Render a Markdown summary of a [`SnapshotDiff`] for review and logs.
///
/// Informational only; the structured diff is the source of truth.
pub fn render_human_summary(diff: &SnapshotDiff) -> String {
    let counts = diff.counts();
    let mut out = String::new();

    out.push_str(&format!("## Snapshot Diff: `{}`\n\n", diff.target));
    out.push_str(&format!(
        "**Run at**: {}  \n**Tracked columns**: {}\n\n",
        diff.run_at.to_rfc3339(),
        if diff.tracked_columns.is_empty() {
            "_none_".to_string()
        } else {
            diff.tracked_columns.join(", ")
        }
    ));

    out.push_str("| NEW | CHANGED | UNCHANGED | DELETED |\n|---|---|---|---|\n");
    out.push_str(&format!(
        "| {} | {} | {} | {} |\n\n",
        counts.new, counts.changed, counts.unchanged, counts.deleted
    ));

    if diff.is_noop() {
        out.push_str("_No changes to write._\n");
    } else {
        for kind in [ChangeKind::New, ChangeKind::Changed, ChangeKind::Deleted] {
            render_kind(&mut out, diff, kind);
        }
    }

    if !diff.stale_keys.is_empty() {
        out.push_str("\n### Stale rows (ignored)\n\n");
        for stale in diff.stale_keys.iter().take(MAX_LISTED_KEYS) {
            out.push_str(&format!(
                "- `{}`: updated_at {} does not advance past {}\n",
                stale.key,
                stale.updated_at.to_rfc3339(),
                stale.current_valid_from.to_rfc3339()
            ));
        }
    }

    out
}

fn render_kind(out: &mut String, diff: &SnapshotDiff, kind: ChangeKind) {
    let changes: Vec<&KeyChange> = diff.changes.values().filter(|c| c.kind() == kind).collect();
    if changes.is_empty() {
        return;
    }

    out.push_str(&format!("### {} ({})\n\n", kind, changes.len()));
    for change in changes.iter().take(MAX_LISTED_KEYS) {
        match change {
            KeyChange::Changed {
                record,
                changed_columns,
                ..
            } => out.push_str(&format!(
                "- `{}`: {}\n",
                record.key,
                changed_columns.join(", ")
            )),
            KeyChange::Deleted { prior, closed_at } => out.push_str(&format!(
                "- `{}` closed at {}\n",
                prior.key,
                closed_at.to_rfc3339()
            )),
            other => out.push_str(&format!("- `{}`\n", other.key())),
        }
    }
    if changes.len() > MAX_LISTED_KEYS {
        out.push_str(&format!(
            "- … and {} more\n",
            changes.len() - MAX_LISTED_KEYS
        ));
    }
    out.push('\n');
}
