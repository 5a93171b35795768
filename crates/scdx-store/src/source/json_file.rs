use scdx_core::errors::ExError;
use scdx_core::RawRow;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{io_error, source_invalid, Result};
use crate::source::RowSource;

/// Rows from a JSON file: either one array of objects or JSON Lines
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for JsonFileSource {
    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn read(&self) -> Result<Vec<RawRow>> {
        let content = fs::read_to_string(&self.path).map_err(|e| io_error("read_json_rows", e))?;
        parse_json_rows(&content)
    }
}

/// Parse rows from JSON text
///
/// Text whose first non-blank character is `[` is read as one array; any
/// other text is read as JSON Lines, skipping blank lines.
///
/// # Errors
///
/// Returns `Validation` naming the offending line or element.
pub fn parse_json_rows(content: &str) -> Result<Vec<RawRow>> {
    let values = if content.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<Value>>(content)
            .map_err(|e| source_invalid("read_json_rows", &format!("invalid JSON array: {}", e)))?
    } else {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<Value>(line).map_err(|e| {
                    source_invalid("read_json_rows", &format!("line {}: {}", i + 1, e))
                })
            })
            .collect::<Result<Vec<_>>>()?
    };

    RawRow::batch_from_json(values).map_err(|e| ExError::from(e).with_op("read_json_rows"))
}
