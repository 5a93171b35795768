//! Run state machine
//!
//! ```text
//! IDLE -> NORMALIZING -> DIFFING -> WRITING -> IDLE
//!                          ^          |
//!                          +----------+   (write conflict, retry)
//! ```
//!
//! `DIFFING -> IDLE` covers dry runs. Any non-terminal phase may move to
//! `FAILED`, which is terminal.

use serde::{Deserialize, Serialize};

use scdx_core::errors::{ExError, ExErrorKind};

/// Phase of one snapshot run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Idle,
    Normalizing,
    Diffing,
    Writing,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Normalizing => "NORMALIZING",
            Self::Diffing => "DIFFING",
            Self::Writing => "WRITING",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if this phase may move to `next`
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed, _) => false,
            (_, Self::Failed) => true,
            (Self::Idle, Self::Normalizing)
            | (Self::Normalizing, Self::Diffing)
            | (Self::Diffing, Self::Writing | Self::Idle)
            | (Self::Writing, Self::Idle | Self::Diffing) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase of a run plus every phase it passed through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    phase: RunPhase,
    visited: Vec<RunPhase>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            visited: vec![RunPhase::Idle],
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Phases in the order they were entered, starting with `IDLE`
    pub fn visited(&self) -> &[RunPhase] {
        &self.visited
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns `IllegalTransition` if the current phase does not allow it;
    /// the state is left unchanged.
    pub fn advance(&mut self, next: RunPhase) -> Result<(), ExError> {
        if !self.phase.can_transition_to(next) {
            return Err(ExError::new(ExErrorKind::IllegalTransition)
                .with_op("run_state")
                .with_message(format!("{} -> {} is not allowed", self.phase, next)));
        }
        self.phase = next;
        self.visited.push(next);
        Ok(())
    }

    /// Mark the run failed; a run that already failed stays failed
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Failed;
            self.visited.push(RunPhase::Failed);
        }
    }
}
