use chrono::{DateTime, Utc};
use rusqlite::Row;
use scdx_core::model::{Attributes, HistorizedRecord};

use crate::errors::{corrupt_row, Result};

/// Columns selected by every history read, in [`decode_row`] order
pub const HISTORY_COLUMNS: &str =
    "scd_id, natural_key, attributes, updated_at, valid_from, valid_to";

pub fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

pub fn from_micros(target: &str, micros: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| corrupt_row(target, &format!("instant {} out of range", micros)))
}

pub fn encode_attributes(attributes: &Attributes) -> Result<String> {
    serde_json::to_string(attributes).map_err(|e| {
        scdx_core::ExError::new(scdx_core::ExErrorKind::Serialization)
            .with_op("encode_attributes")
            .with_message(e.to_string())
    })
}

/// Raw column values of one history row
pub struct StoredRow {
    scd_id: String,
    natural_key: String,
    attributes: String,
    updated_at: i64,
    valid_from: i64,
    valid_to: Option<i64>,
}

impl StoredRow {
    pub fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            scd_id: row.get(0)?,
            natural_key: row.get(1)?,
            attributes: row.get(2)?,
            updated_at: row.get(3)?,
            valid_from: row.get(4)?,
            valid_to: row.get(5)?,
        })
    }
}

/// Turn a stored row into a record, failing on values no writer produces
pub fn decode_row(target: &str, row: StoredRow) -> Result<HistorizedRecord> {
    let attributes: Attributes = serde_json::from_str(&row.attributes).map_err(|e| {
        corrupt_row(
            target,
            &format!("attributes of {} are not a JSON object: {}", row.scd_id, e),
        )
    })?;
    Ok(HistorizedRecord {
        scd_id: row.scd_id,
        key: row.natural_key,
        attributes,
        updated_at: from_micros(target, row.updated_at)?,
        valid_from: from_micros(target, row.valid_from)?,
        valid_to: row
            .valid_to
            .map(|m| from_micros(target, m))
            .transpose()?,
    })
}
