//! Record normalizer
//!
//! Reduces a raw batch to exactly one row per natural key: the row with the
//! greatest `updated_at`, ties going to the row ingested last. The batch is
//! validated as a whole, so a single malformed row fails the entire batch and
//! every malformed row is reported together.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::SnapshotConfig;
use crate::errors::{Result, ScdxError};
use crate::model::{parse_timestamp, render_key, NormalizedRecord, RawRow};

/// The normalized "current state" of one input batch
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    /// One record per key, ordered by key
    pub records: BTreeMap<String, NormalizedRecord>,
    /// Every attribute column seen in the batch (key/timestamp excluded)
    pub columns: BTreeSet<String>,
    pub key_column: String,
    pub updated_at_column: String,
    /// Raw rows read
    pub rows_in: usize,
    /// Rows discarded because a more recent row shared their key
    pub superseded: usize,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&NormalizedRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedRecord> {
        self.records.values()
    }
}

/// Normalize a raw batch against `config`
///
/// # Errors
///
/// Returns `MalformedRows` listing every row that lacks the natural key, lacks
/// the timestamp, or carries a timestamp that cannot be interpreted. Keys
/// render to text, so a key whose JSON type differs from the batch's first
/// key (`"1"` against `1`) is malformed too. Nothing is returned for a batch
/// containing any such row.
pub fn normalize(rows: &[RawRow], config: &SnapshotConfig) -> Result<NormalizedBatch> {
    let mut records: BTreeMap<String, NormalizedRecord> = BTreeMap::new();
    let mut columns = BTreeSet::new();
    let mut implicated = Vec::new();
    let mut problems = Vec::new();
    let mut superseded = 0usize;
    let mut batch_key_type: Option<&'static str> = None;

    for row in rows {
        let raw_key = row.get(&config.unique_key);
        let key = raw_key.and_then(render_key);
        let label = key.clone().unwrap_or_else(|| format!("row#{}", row.seq));

        let mut mistyped = false;
        if let (Some(_), Some(value)) = (&key, raw_key) {
            let this = json_type(value);
            let expected = *batch_key_type.get_or_insert(this);
            if this != expected {
                problems.push(format!(
                    "{}: {} is a {} but earlier keys are {}s",
                    label, config.unique_key, this, expected
                ));
                mistyped = true;
            }
        }

        let updated_at = match row.get(&config.updated_at) {
            None | Some(serde_json::Value::Null) => {
                problems.push(format!("{}: missing {}", label, config.updated_at));
                None
            }
            Some(value) => {
                let parsed = parse_timestamp(value);
                if parsed.is_none() {
                    problems.push(format!(
                        "{}: unparseable {} value {}",
                        label, config.updated_at, value
                    ));
                }
                parsed
            }
        };

        if key.is_none() {
            problems.push(format!("{}: missing {}", label, config.unique_key));
        }

        let (Some(key), Some(updated_at), false) = (key, updated_at, mistyped) else {
            implicated.push(label);
            continue;
        };

        let attributes: crate::model::Attributes = row
            .columns
            .iter()
            .filter(|(name, _)| *name != &config.unique_key && *name != &config.updated_at)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        columns.extend(attributes.keys().cloned());

        let candidate = NormalizedRecord {
            key: key.clone(),
            updated_at,
            attributes,
            ingest_seq: row.seq,
        };

        match records.get(&key) {
            Some(existing) if !supersedes(&candidate, existing) => superseded += 1,
            Some(_) => {
                superseded += 1;
                records.insert(key, candidate);
            }
            None => {
                records.insert(key, candidate);
            }
        }
    }

    if !implicated.is_empty() {
        return Err(ScdxError::MalformedRows {
            rows: implicated,
            problems,
        });
    }

    tracing::debug!(
        target_table = %config.target,
        rows_in = rows.len(),
        keys = records.len(),
        superseded,
        "Normalized batch"
    );

    Ok(NormalizedBatch {
        records,
        columns,
        key_column: config.unique_key.clone(),
        updated_at_column: config.updated_at.clone(),
        rows_in: rows.len(),
        superseded,
    })
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::String(_) => "string",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Null => "null",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Recency ranking: later `updated_at` wins, then later ingestion
fn supersedes(candidate: &NormalizedRecord, existing: &NormalizedRecord) -> bool {
    (candidate.updated_at, candidate.ingest_seq) > (existing.updated_at, existing.ingest_seq)
}
