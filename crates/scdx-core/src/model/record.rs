use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{Result, ScdxError};

/// Column name → value, ordered by column name
pub type Attributes = BTreeMap<String, Value>;

/// One incoming row as read from a source
///
/// `seq` is the ingestion order of the row within its batch and is the
/// tie-breaker when two rows for the same key share an `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub seq: u64,
    pub columns: Attributes,
}

impl RawRow {
    pub fn new(seq: u64, columns: Attributes) -> Self {
        Self { seq, columns }
    }

    /// Build a row from a JSON object
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if `value` is not a JSON object.
    pub fn from_json(seq: u64, value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                seq,
                columns: map.into_iter().collect(),
            }),
            other => Err(ScdxError::Serialization {
                message: format!("row {} is not a JSON object: {}", seq, other),
            }),
        }
    }

    /// Build a batch from JSON objects, numbering rows by position
    pub fn batch_from_json(values: Vec<Value>) -> Result<Vec<Self>> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| Self::from_json(i as u64, v))
            .collect()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }
}

/// Render a natural-key value as its canonical string form.
///
/// Strings are used verbatim and numbers/booleans in their JSON text form.
/// Nulls, arrays and objects are not valid keys.
pub fn render_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// The current representation of one natural key after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Natural key (canonical string form)
    pub key: String,

    /// Recency timestamp of the winning row
    pub updated_at: DateTime<Utc>,

    /// Every column except the key and `updated_at` columns
    pub attributes: Attributes,

    /// Ingestion sequence of the winning row
    pub ingest_seq: u64,
}

impl NormalizedRecord {
    /// Attribute value, with an absent column read as null
    pub fn attribute(&self, column: &str) -> &Value {
        self.attributes.get(column).unwrap_or(&Value::Null)
    }
}
