use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::record::{Attributes, NormalizedRecord};

/// Stable surrogate id for one validity interval.
///
/// SHA-256 over the natural key and the interval's `valid_from`, so the same
/// key/start always maps to the same id across stores.
pub fn scd_id(key: &str, valid_from: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b"|");
    hasher.update(valid_from.timestamp_micros().to_be_bytes());
    hex::encode(hasher.finalize())
}

/// One validity interval of a natural key
///
/// Intervals are half-open: `[valid_from, valid_to)`. `valid_to == None`
/// marks the current interval. Only `valid_to` of the current interval is
/// ever mutated, and only once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorizedRecord {
    pub scd_id: String,
    pub key: String,
    pub attributes: Attributes,
    /// `updated_at` of the row that opened this interval
    pub updated_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl HistorizedRecord {
    /// Open a new current interval for `record` starting at `valid_from`
    pub fn open(record: &NormalizedRecord, valid_from: DateTime<Utc>) -> Self {
        Self {
            scd_id: scd_id(&record.key, valid_from),
            key: record.key.clone(),
            attributes: record.attributes.clone(),
            updated_at: record.updated_at,
            valid_from,
            valid_to: None,
        }
    }

    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Was this interval the truth at `at`?
    pub fn was_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && self.valid_to.map_or(true, |t| t > at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    fn record() -> NormalizedRecord {
        let mut attributes = Attributes::new();
        attributes.insert("name".into(), json!("A"));
        NormalizedRecord {
            key: "1".into(),
            updated_at: ts(1),
            attributes,
            ingest_seq: 0,
        }
    }

    #[test]
    fn test_scd_id_deterministic() {
        assert_eq!(scd_id("1", ts(1)), scd_id("1", ts(1)));
        assert_ne!(scd_id("1", ts(1)), scd_id("1", ts(2)));
        assert_ne!(scd_id("1", ts(1)), scd_id("2", ts(1)));
        assert_eq!(scd_id("1", ts(1)).len(), 64);
    }

    #[test]
    fn test_open_interval_is_current() {
        let row = HistorizedRecord::open(&record(), ts(1));
        assert!(row.is_current());
        assert_eq!(row.valid_from, ts(1));
        assert_eq!(row.attributes.get("name"), Some(&json!("A")));
    }

    #[test]
    fn test_was_valid_at_half_open() {
        let mut row = HistorizedRecord::open(&record(), ts(1));
        row.valid_to = Some(ts(3));
        assert!(!row.was_valid_at(ts(0)));
        assert!(row.was_valid_at(ts(1)));
        assert!(row.was_valid_at(ts(2)));
        assert!(!row.was_valid_at(ts(3)));
    }
}
