use scdx_core_types::{RunId, TraceId};
use thiserror::Error;

/// Result type alias using ScdxError
pub type Result<T> = std::result::Result<T, ScdxError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code usable for programmatic handling,
/// tests, and the run ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    // Input
    /// A raw row is malformed (missing natural key or timestamp, bad timestamp)
    Validation,
    /// A tracked column is absent from the input or the historized table
    SchemaMismatch,
    /// A snapshot configuration is malformed
    InvalidConfig,
    /// An error-severity data-quality check failed
    CheckFailed,

    // Writing
    /// Another writer changed the current interval of an implicated key
    WriteConflict,
    /// A run for the same target is already writing
    RunInProgress,
    /// A run state machine was asked to make a transition it does not allow
    IllegalTransition,
    /// A historized table invariant does not hold
    InvariantViolation,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::SchemaMismatch => "ERR_SCHEMA_MISMATCH",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::CheckFailed => "ERR_CHECK_FAILED",
            ExErrorKind::WriteConflict => "ERR_WRITE_CONFLICT",
            ExErrorKind::RunInProgress => "ERR_RUN_IN_PROGRESS",
            ExErrorKind::IllegalTransition => "ERR_ILLEGAL_TRANSITION",
            ExErrorKind::InvariantViolation => "ERR_INVARIANT_VIOLATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether a failed run with this kind may be retried in full
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExErrorKind::WriteConflict)
    }
}

/// Canonical structured error type
///
/// Carries the classification plus the context a failed run must report:
/// the operation, the target table, the run, and the natural keys implicated.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    target: Option<String>,
    keys: Vec<String>,
    run_id: Option<RunId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            target: None,
            keys: Vec::new(),
            run_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add target table context
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a single implicated natural key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Add implicated natural keys
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Add run ID context
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Natural keys implicated in the failure (empty if none)
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(target) = &self.target {
            write!(f, " (target: {})", target)?;
        }
        if !self.keys.is_empty() {
            write!(f, " (keys: {})", self.keys.join(", "))?;
        }
        if let Some(run_id) = &self.run_id {
            write!(f, " (run_id: {})", run_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain errors raised by the pure snapshot pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScdxError {
    /// One or more raw rows could not be normalized
    #[error("{} malformed row(s): {}", .problems.len(), .problems.join("; "))]
    MalformedRows {
        /// Implicated keys, or `row#N` where the key itself is missing
        rows: Vec<String>,
        problems: Vec<String>,
    },

    /// Tracked columns missing from the input and/or the historized table
    #[error("Tracked columns missing (input: {missing_in_input:?}, table: {missing_in_table:?})")]
    SchemaMismatch {
        missing_in_input: Vec<String>,
        missing_in_table: Vec<String>,
    },

    /// Snapshot configuration is invalid
    #[error("Invalid snapshot config for {target}: {reason}")]
    InvalidConfig { target: String, reason: String },

    /// A write expectation did not hold (current interval moved underneath us)
    #[error("Write conflict on {} key(s)", .keys.len())]
    WriteConflict { keys: Vec<String> },

    /// History invariant violation
    #[error("Invariant violated for key {key}: {reason}")]
    InvariantViolation { key: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Conversion from ScdxError to ExError
impl From<ScdxError> for ExError {
    fn from(err: ScdxError) -> Self {
        match err {
            ScdxError::MalformedRows { rows, problems } => ExError::new(ExErrorKind::Validation)
                .with_op("normalize")
                .with_keys(rows)
                .with_message(problems.join("; ")),

            ScdxError::SchemaMismatch {
                missing_in_input,
                missing_in_table,
            } => {
                let mut parts = Vec::new();
                if !missing_in_input.is_empty() {
                    parts.push(format!("absent from input: {}", missing_in_input.join(", ")));
                }
                if !missing_in_table.is_empty() {
                    parts.push(format!("absent from table: {}", missing_in_table.join(", ")));
                }
                ExError::new(ExErrorKind::SchemaMismatch)
                    .with_op("compute_diff")
                    .with_message(parts.join("; "))
            }

            ScdxError::InvalidConfig { target, reason } => ExError::new(ExErrorKind::InvalidConfig)
                .with_target(target)
                .with_message(reason),

            ScdxError::WriteConflict { keys } => ExError::new(ExErrorKind::WriteConflict)
                .with_op("apply_plan")
                .with_keys(keys)
                .with_message("current interval changed since it was read"),

            ScdxError::InvariantViolation { key, reason } => {
                ExError::new(ExErrorKind::InvariantViolation)
                    .with_key(key)
                    .with_message(reason)
            }

            ScdxError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for ScdxError {
    fn from(err: serde_json::Error) -> Self {
        ScdxError::Serialization {
            message: err.to_string(),
        }
    }
}
