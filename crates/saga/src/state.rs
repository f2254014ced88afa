//! Saga run state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga run in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          ├──► Aborted
///                          └──► Compensating ──┬──► Failed
///                                              └──► TimedOut
/// ```
///
/// `Aborted` is reached without compensation (rejected before anything was
/// mutated) or, when an abort happens mid-run, after the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Run has not started yet.
    #[default]
    NotStarted,

    /// Steps are being executed.
    Running,

    /// A step failed or the deadline passed; compensations are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Run was rejected for a business reason (terminal state).
    Aborted,

    /// Compensation finished after a step failure (terminal state).
    Failed,

    /// Compensation finished after the deadline passed (terminal state).
    TimedOut,
}

impl SagaState {
    /// Returns true if the run can begin executing steps.
    pub fn can_run(&self) -> bool {
        matches!(self, SagaState::NotStarted)
    }

    /// Returns true if the run can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Aborted | SagaState::Failed | SagaState::TimedOut
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Aborted => "Aborted",
            SagaState::Failed => "Failed",
            SagaState::TimedOut => "TimedOut",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
