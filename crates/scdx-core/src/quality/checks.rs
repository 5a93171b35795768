use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::{ExError, ExErrorKind};
use crate::model::NormalizedRecord;
use crate::normalize::NormalizedBatch;

/// How a failing check affects the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort the run before writing
    #[default]
    Error,
    /// Log and continue
    Warn,
}

/// One configured check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckSpec {
    /// Registered test name
    pub test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Allowed values for `accepted_values`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Value>,
    #[serde(default)]
    pub severity: Severity,
}

const COLUMN_TESTS: &[&str] = &["not_null", "unique", "accepted_values"];

impl CheckSpec {
    pub fn new(test: impl Into<String>, column: Option<&str>, severity: Severity) -> Self {
        Self {
            test: test.into(),
            column: column.map(str::to_string),
            values: Vec::new(),
            severity,
        }
    }

    pub fn with_values<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.values = values.into_iter().collect();
        self
    }

    /// Human label, e.g. `not_null(email)`
    pub fn label(&self) -> String {
        match &self.column {
            Some(column) => format!("{}({})", self.test, column),
            None => self.test.clone(),
        }
    }

    /// Structural validation; unknown test names are caught at evaluation
    ///
    /// # Errors
    ///
    /// Returns the reason the check is malformed.
    pub fn validate(&self) -> Result<(), String> {
        if self.test.trim().is_empty() {
            return Err("check test name must not be empty".into());
        }
        if COLUMN_TESTS.contains(&self.test.as_str()) && self.column.is_none() {
            return Err(format!("check '{}' requires a column", self.test));
        }
        if self.test == "accepted_values" && self.values.is_empty() {
            return Err("check 'accepted_values' requires at least one value".into());
        }
        Ok(())
    }
}

/// Returns the keys (or a batch-level label) that fail the check
pub type CheckPredicate = Arc<dyn Fn(&NormalizedBatch, &CheckSpec) -> Vec<String> + Send + Sync>;

/// Value of `column` for `record`; the key and timestamp columns are
/// addressable even though they are not stored as attributes
fn column_value(batch: &NormalizedBatch, record: &NormalizedRecord, column: &str) -> Value {
    if column == batch.key_column {
        Value::String(record.key.clone())
    } else if column == batch.updated_at_column {
        Value::String(record.updated_at.to_rfc3339())
    } else {
        record.attribute(column).clone()
    }
}

fn not_null(batch: &NormalizedBatch, spec: &CheckSpec) -> Vec<String> {
    let column = spec.column.as_deref().unwrap_or_default();
    batch
        .iter()
        .filter(|r| column_value(batch, r, column).is_null())
        .map(|r| r.key.clone())
        .collect()
}

fn unique(batch: &NormalizedBatch, spec: &CheckSpec) -> Vec<String> {
    let column = spec.column.as_deref().unwrap_or_default();
    let mut by_value: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for record in batch.iter() {
        let value = column_value(batch, record, column);
        if value.is_null() {
            continue;
        }
        by_value
            .entry(value.to_string())
            .or_default()
            .push(record.key.clone());
    }
    let mut keys: Vec<String> = by_value
        .into_values()
        .filter(|keys| keys.len() > 1)
        .flatten()
        .collect();
    keys.sort();
    keys
}

/// Nulls pass; combine with `not_null` to forbid them
fn accepted_values(batch: &NormalizedBatch, spec: &CheckSpec) -> Vec<String> {
    let column = spec.column.as_deref().unwrap_or_default();
    batch
        .iter()
        .filter(|r| {
            let value = column_value(batch, r, column);
            !value.is_null() && !spec.values.contains(&value)
        })
        .map(|r| r.key.clone())
        .collect()
}

fn not_empty(batch: &NormalizedBatch, _spec: &CheckSpec) -> Vec<String> {
    if batch.is_empty() {
        vec!["<empty batch>".to_string()]
    } else {
        Vec::new()
    }
}

/// Result of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub check: String,
    pub severity: Severity,
    pub failing: Vec<String>,
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        self.failing.is_empty()
    }
}

/// Results of every configured check, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn warnings(&self) -> usize {
        self.failures()
            .filter(|o| o.severity == Severity::Warn)
            .count()
    }

    /// The error that must abort the run, if any error-severity check failed
    pub fn blocking(&self) -> Option<ExError> {
        let blocking: Vec<&CheckOutcome> = self
            .failures()
            .filter(|o| o.severity == Severity::Error)
            .collect();
        if blocking.is_empty() {
            return None;
        }

        let mut keys: Vec<String> = blocking
            .iter()
            .flat_map(|o| o.failing.iter().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        let message = blocking
            .iter()
            .map(|o| format!("{} failed for {} key(s)", o.check, o.failing.len()))
            .collect::<Vec<_>>()
            .join("; ");

        Some(
            ExError::new(ExErrorKind::CheckFailed)
                .with_op("run_checks")
                .with_keys(keys)
                .with_message(message),
        )
    }
}

/// Named check predicates
#[derive(Clone)]
pub struct CheckRegistry {
    predicates: HashMap<String, CheckPredicate>,
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("CheckRegistry").field("tests", &names).finish()
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CheckRegistry {
    /// Registry without any tests
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("not_null", not_null);
        registry.register("unique", unique);
        registry.register("accepted_values", accepted_values);
        registry.register("not_empty", not_empty);
        registry
    }

    /// Register (or replace) a test
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&NormalizedBatch, &CheckSpec) -> Vec<String> + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Run every check against `batch`
    ///
    /// Warn-severity failures are logged here; error-severity failures are
    /// surfaced through [`CheckReport::blocking`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a check names an unregistered test.
    pub fn evaluate(
        &self,
        batch: &NormalizedBatch,
        checks: &[CheckSpec],
    ) -> Result<CheckReport, ExError> {
        let mut outcomes = Vec::with_capacity(checks.len());
        for spec in checks {
            let predicate = self.predicates.get(&spec.test).ok_or_else(|| {
                ExError::new(ExErrorKind::InvalidConfig)
                    .with_op("run_checks")
                    .with_message(format!("unknown check test '{}'", spec.test))
            })?;
            let failing = predicate(batch, spec);
            if !failing.is_empty() && spec.severity == Severity::Warn {
                tracing::warn!(
                    check = %spec.label(),
                    failing = failing.len(),
                    "Data quality check failed (warn)"
                );
            }
            outcomes.push(CheckOutcome {
                check: spec.label(),
                severity: spec.severity,
                failing,
            });
        }
        Ok(CheckReport { outcomes })
    }
}
