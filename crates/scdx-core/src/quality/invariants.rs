use std::collections::BTreeMap;

use crate::errors::{Result, ScdxError};
use crate::model::HistorizedRecord;

fn by_key(rows: &[HistorizedRecord]) -> BTreeMap<&str, Vec<&HistorizedRecord>> {
    let mut grouped: BTreeMap<&str, Vec<&HistorizedRecord>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.key.as_str()).or_default().push(row);
    }
    for intervals in grouped.values_mut() {
        intervals.sort_by_key(|r| r.valid_from);
    }
    grouped
}

/// Keys with more than one current interval
pub fn find_multiple_current(rows: &[HistorizedRecord]) -> Vec<String> {
    by_key(rows)
        .into_iter()
        .filter(|(_, intervals)| intervals.iter().filter(|r| r.is_current()).count() > 1)
        .map(|(key, _)| key.to_string())
        .collect()
}

/// Intervals that end before they start, or overlap the next interval of
/// the same key
///
/// Returns list of (key, scd_id) tuples
pub fn find_overlaps(rows: &[HistorizedRecord]) -> Vec<(String, String)> {
    let mut overlaps = Vec::new();
    for (key, intervals) in by_key(rows) {
        for (i, row) in intervals.iter().enumerate() {
            let inverted = row.valid_to.is_some_and(|to| to < row.valid_from);
            let overlaps_next = intervals.get(i + 1).is_some_and(|next| match row.valid_to {
                // An open interval followed by anything overlaps
                None => true,
                Some(to) => to > next.valid_from,
            });
            if inverted || overlaps_next {
                overlaps.push((key.to_string(), row.scd_id.clone()));
            }
        }
    }
    overlaps
}

/// Places where a key's consecutive intervals do not touch
///
/// A gap is legitimate after a hard-delete closure followed by a
/// re-appearance, so callers decide whether gaps are errors.
///
/// Returns list of (key, scd_id of the interval before the gap) tuples
pub fn find_gaps(rows: &[HistorizedRecord]) -> Vec<(String, String)> {
    let mut gaps = Vec::new();
    for (key, intervals) in by_key(rows) {
        for pair in intervals.windows(2) {
            if let Some(to) = pair[0].valid_to {
                if to < pair[1].valid_from {
                    gaps.push((key.to_string(), pair[0].scd_id.clone()));
                }
            }
        }
    }
    gaps
}

/// At most one current interval per key
///
/// # Errors
///
/// Returns `InvariantViolation` naming the first offending key.
pub fn verify_currency(rows: &[HistorizedRecord]) -> Result<()> {
    match find_multiple_current(rows).into_iter().next() {
        Some(key) => Err(ScdxError::InvariantViolation {
            key,
            reason: "more than one current interval".into(),
        }),
        None => Ok(()),
    }
}

/// Each key's intervals form a non-overlapping chain; gaps are violations
/// unless `allow_gaps`
///
/// # Errors
///
/// Returns `InvariantViolation` naming the first offending key.
pub fn verify_contiguity(rows: &[HistorizedRecord], allow_gaps: bool) -> Result<()> {
    if let Some((key, scd_id)) = find_overlaps(rows).into_iter().next() {
        return Err(ScdxError::InvariantViolation {
            key,
            reason: format!("interval {} overlaps its successor", scd_id),
        });
    }
    if !allow_gaps {
        if let Some((key, scd_id)) = find_gaps(rows).into_iter().next() {
            return Err(ScdxError::InvariantViolation {
                key,
                reason: format!("gap after interval {}", scd_id),
            });
        }
    }
    Ok(())
}

/// Check the structural invariants of a historized table
///
/// # Errors
///
/// Returns the first violation of [`verify_currency`] or
/// [`verify_contiguity`].
pub fn verify_history(rows: &[HistorizedRecord], allow_gaps: bool) -> Result<()> {
    verify_currency(rows)?;
    verify_contiguity(rows, allow_gaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NormalizedRecord;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn interval(key: &str, from: u32, to: Option<u32>) -> HistorizedRecord {
        let record = NormalizedRecord {
            key: key.into(),
            updated_at: ts(from),
            attributes: BTreeMap::new(),
            ingest_seq: 0,
        };
        let mut row = HistorizedRecord::open(&record, ts(from));
        row.valid_to = to.map(ts);
        row
    }

    #[test]
    fn test_contiguous_chain_is_valid() {
        let rows = vec![
            interval("1", 1, Some(2)),
            interval("1", 2, Some(4)),
            interval("1", 4, None),
            interval("2", 3, None),
        ];
        assert!(verify_history(&rows, false).is_ok());
    }

    #[test]
    fn test_detects_two_current() {
        let rows = vec![interval("1", 1, None), interval("1", 2, None)];
        assert_eq!(find_multiple_current(&rows), vec!["1".to_string()]);
        assert!(verify_currency(&rows).is_err());
        assert!(verify_history(&rows, true).is_err());
    }

    #[test]
    fn test_detects_overlap() {
        let rows = vec![interval("1", 1, Some(3)), interval("1", 2, None)];
        assert_eq!(find_overlaps(&rows).len(), 1);
    }

    #[test]
    fn test_gap_allowed_only_when_requested() {
        let rows = vec![interval("1", 1, Some(2)), interval("1", 5, None)];
        assert_eq!(find_gaps(&rows).len(), 1);
        assert!(verify_history(&rows, true).is_ok());
        assert!(matches!(
            verify_history(&rows, false),
            Err(ScdxError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn test_zero_length_interval_is_not_an_overlap() {
        let rows = vec![interval("1", 2, Some(2)), interval("1", 2, None)];
        assert!(find_overlaps(&rows).is_empty());
    }
}
