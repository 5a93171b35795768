//! Durable historized tables
//!
//! [`SqliteHistoryStore`] implements `scdx_core::HistoryStore` on SQLite.
//! Instants are stored as integer microseconds since the epoch and
//! attributes as a JSON object.

pub(crate) mod codec;
mod sqlite_store;

pub use sqlite_store::SqliteHistoryStore;
