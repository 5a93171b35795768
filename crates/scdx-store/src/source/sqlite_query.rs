use rusqlite::types::ValueRef;
use rusqlite::Connection;
use scdx_core::model::Attributes;
use scdx_core::RawRow;
use serde_json::Value;
use std::path::PathBuf;

use crate::db;
use crate::errors::{from_rusqlite, Result};
use crate::source::RowSource;

/// Rows from a query against a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteQuerySource {
    path: PathBuf,
    query: String,
}

impl SqliteQuerySource {
    pub fn new(path: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
        }
    }
}

impl RowSource for SqliteQuerySource {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn read(&self) -> Result<Vec<RawRow>> {
        let conn = db::open(&self.path)?;
        read_query_rows(&conn, &self.query)
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

/// Run `query` and turn each result row into a raw row keyed by column name
///
/// Integers and reals become JSON numbers, text becomes strings and blobs
/// become hex strings.
///
/// # Errors
///
/// Returns `Persistence` if the query fails.
pub fn read_query_rows(conn: &Connection, query: &str) -> Result<Vec<RawRow>> {
    let mut stmt = conn.prepare(query).map_err(from_rusqlite)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([]).map_err(from_rusqlite)?;
    let mut batch = Vec::new();
    while let Some(row) = rows.next().map_err(from_rusqlite)? {
        let mut columns = Attributes::new();
        for (i, name) in names.iter().enumerate() {
            let value = row.get_ref(i).map_err(from_rusqlite)?;
            columns.insert(name.clone(), to_json(value));
        }
        batch.push(RawRow::new(batch.len() as u64, columns));
    }

    tracing::debug!(rows = batch.len(), "Read rows from query");
    Ok(batch)
}
