//! Correlation types for run tracking and tracing
//!
//! Every snapshot run carries a `RunId`; an optional `TraceId` lets callers
//! stitch a run into a wider trace owned by whatever triggered it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single snapshot run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Generate a new RunId using UUIDv7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create from an existing string (for ledger reads)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trace identifier supplied by the caller that triggered a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a new random TraceId using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context carried through a run for log and error correlation
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub target: String,
    pub trace_id: Option<TraceId>,
}

impl RunContext {
    /// Create a context for `target` with a fresh RunId
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            target: target.into(),
            trace_id: None,
        }
    }

    /// Attach a caller-supplied TraceId
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}
