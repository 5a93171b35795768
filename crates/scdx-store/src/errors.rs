//! Error handling for scdx-store
//!
//! Wraps scdx-core ExError with store-specific helpers

use scdx_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a configuration file error
pub fn config_invalid(reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidConfig)
        .with_op("config_parse")
        .with_message(reason.to_string())
}

/// Create a row source error
pub fn source_invalid(op: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Validation)
        .with_op(op.to_string())
        .with_message(reason.to_string())
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Map a failure to take the write lock
///
/// A busy or locked database means another writer holds the lock past the
/// busy timeout. That is writer contention, so it surfaces as a retryable
/// `WriteConflict` on the plan's keys.
pub fn write_lock_error<I, S>(target: &str, keys: I, err: rusqlite::Error) -> ExError
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
            ExError::new(ExErrorKind::WriteConflict)
                .with_op("apply_plan")
                .with_target(target)
                .with_keys(keys)
                .with_message(format!("write lock unavailable: {}", err))
        }
        _ => from_rusqlite(err),
    }
}

/// Create a decoding error for a stored value
pub fn corrupt_row(target: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op("decode_history")
        .with_target(target)
        .with_message(reason.to_string())
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}
