//! Snapshot target configuration
//!
//! One [`SnapshotConfig`] describes how a single target table is historized:
//! which column is the natural key, which carries recency, which columns take
//! part in change detection, and how absent keys and write conflicts are
//! handled. Files holding several configs are parsed by `scdx-store`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::errors::{Result, ScdxError};
use crate::quality::CheckSpec;

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Bounded retry with exponential backoff for write conflicts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests, single-writer setups)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Configuration for historizing one target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Name of the historized target table
    pub target: String,

    /// Natural-key column
    pub unique_key: String,

    /// Recency timestamp column
    pub updated_at: String,

    /// Columns compared for change detection; `None` means every non-key,
    /// non-audit column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked_columns: Option<Vec<String>>,

    /// Columns stored but never compared (load metadata and the like)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audit_columns: Vec<String>,

    /// Close the current interval of keys absent from the input
    #[serde(default)]
    pub invalidate_hard_deletes: bool,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Data-quality checks evaluated on the normalized batch before writing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckSpec>,
}

impl SnapshotConfig {
    pub fn new(
        target: impl Into<String>,
        unique_key: impl Into<String>,
        updated_at: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            unique_key: unique_key.into(),
            updated_at: updated_at.into(),
            tracked_columns: None,
            audit_columns: Vec::new(),
            invalidate_hard_deletes: false,
            retry: RetryPolicy::default(),
            checks: Vec::new(),
        }
    }

    pub fn with_tracked_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_audit_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audit_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_invalidate_hard_deletes(mut self, enabled: bool) -> Self {
        self.invalidate_hard_deletes = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_check(mut self, check: CheckSpec) -> Self {
        self.checks.push(check);
        self
    }

    /// Is `column` excluded from default change detection?
    pub fn is_audit_column(&self, column: &str) -> bool {
        column == self.updated_at || self.audit_columns.iter().any(|c| c == column)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` when a required name is empty, the key and
    /// timestamp columns coincide, tracked columns are empty, duplicated or
    /// name the key/timestamp columns, retry allows zero attempts, or a check
    /// is malformed.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ScdxError::InvalidConfig {
            target: self.target.clone(),
            reason,
        };

        if self.target.trim().is_empty() {
            return Err(invalid("target must not be empty".into()));
        }
        if self.unique_key.trim().is_empty() {
            return Err(invalid("unique_key must not be empty".into()));
        }
        if self.updated_at.trim().is_empty() {
            return Err(invalid("updated_at must not be empty".into()));
        }
        if self.unique_key == self.updated_at {
            return Err(invalid(format!(
                "unique_key and updated_at both name column '{}'",
                self.unique_key
            )));
        }

        if let Some(tracked) = &self.tracked_columns {
            if tracked.is_empty() {
                return Err(invalid(
                    "tracked_columns must list at least one column (omit it to track all)".into(),
                ));
            }
            let mut seen = BTreeSet::new();
            for column in tracked {
                if column == &self.unique_key || column == &self.updated_at {
                    return Err(invalid(format!(
                        "tracked column '{}' is the key or timestamp column",
                        column
                    )));
                }
                if !seen.insert(column.as_str()) {
                    return Err(invalid(format!("tracked column '{}' listed twice", column)));
                }
            }
        }

        if self.audit_columns.iter().any(|c| c == &self.unique_key) {
            return Err(invalid(format!(
                "audit_columns must not include the key column '{}'",
                self.unique_key
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1".into()));
        }

        for check in &self.checks {
            check.validate().map_err(|reason| invalid(reason))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{CheckSpec, Severity};

    fn base() -> SnapshotConfig {
        SnapshotConfig::new("dim_customers", "id", "updated_at")
    }

    #[test]
    fn test_defaults() {
        let config = base();
        assert!(config.tracked_columns.is_none());
        assert!(!config.invalidate_hard_deletes);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_audit_columns_include_timestamp() {
        let config = base().with_audit_columns(["_loaded_at"]);
        assert!(config.is_audit_column("updated_at"));
        assert!(config.is_audit_column("_loaded_at"));
        assert!(!config.is_audit_column("name"));
    }

    #[test]
    fn test_rejects_key_equal_to_timestamp() {
        let config = SnapshotConfig::new("t", "id", "id");
        assert!(matches!(
            config.validate(),
            Err(ScdxError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_tracking_the_key() {
        let config = base().with_tracked_columns(["name", "id"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_tracked_list() {
        let config = base().with_tracked_columns(Vec::<String>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_tracked_column() {
        let config = base().with_tracked_columns(["name", "name"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = base().with_retry(RetryPolicy::immediate(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_check() {
        let config = base().with_check(CheckSpec::new("not_null", None, Severity::Error));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(350));
        assert_eq!(retry.backoff(30), Duration::from_millis(350));
        assert_eq!(RetryPolicy::immediate(3).backoff(2), Duration::ZERO);
    }
}
