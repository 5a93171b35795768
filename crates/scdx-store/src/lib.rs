//! SCDX Store - SQLite persistence, configuration files and row sources
//!
//! Provides:
//! - SQLite schema with an embedded, checksummed migrations framework
//! - `SqliteHistoryStore`, the durable `HistoryStore` with compare-and-swap writes
//! - The run ledger
//! - YAML snapshot configuration files
//! - Row sources for JSON files and SQLite queries

pub mod config;
pub mod db;
pub mod errors;
pub mod history;
pub mod ledger;
pub mod migrations;
pub mod source;

// Re-export key types
pub use config::{parse_config_file, parse_config_str, SnapshotProject};
pub use errors::Result;
pub use history::SqliteHistoryStore;
pub use source::{JsonFileSource, RowSource, SqliteQuerySource};
