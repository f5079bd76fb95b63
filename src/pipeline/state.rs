//! Job lifecycle.
//!
//! `Received → Transcribed → Responded → Emitting(1..N) → Complete`, with
//! `Failed` reachable from every non-terminal state. No skipping, no going
//! back.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Transcribed,
    Responded,
    /// Producing chunk `chunk` (1-based).
    Emitting {
        chunk: usize,
    },
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether `next` may directly follow `self`.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Complete | Failed, _) => false,
            (_, Failed) => true,
            (Received, Transcribed) => true,
            (Transcribed, Responded) => true,
            (Responded, Emitting { chunk }) => chunk == 1,
            (Emitting { chunk: current }, Emitting { chunk }) => chunk == current + 1,
            (Emitting { .. }, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Transcribed => write!(f, "transcribed"),
            Self::Responded => write!(f, "responded"),
            Self::Emitting { chunk } => write!(f, "emitting({})", chunk),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Current state of one job, refusing illegal transitions.
#[derive(Debug, Clone)]
pub struct JobTracker {
    state: JobState,
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            state: JobState::Received,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`. Returns false and leaves the state unchanged if the
    /// transition is not allowed.
    pub fn advance(&mut self, next: JobState) -> bool {
        let allowed = self.state.can_advance_to(next);
        debug_assert!(allowed, "illegal transition {} -> {}", self.state, next);
        if allowed {
            tracing::debug!(from = %self.state, to = %next, "job state");
            self.state = next;
        } else {
            tracing::error!(from = %self.state, to = %next, "illegal job state transition");
        }
        allowed
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}
