//! Structured result of a saga run and failure classification.

use std::collections::HashMap;
use std::time::Duration;

use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::events::SagaEvent;

/// Terminal status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeStatus {
    /// Every step ran to completion.
    Completed,
    /// Rejected for a business reason (duplicate submission, invalid entity).
    Aborted,
    /// A step failed after exhausting retries; compensation ran.
    Failed,
    /// The deadline passed; compensation ran for completed steps.
    TimedOut,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Completed => "Completed",
            OutcomeStatus::Aborted => "Aborted",
            OutcomeStatus::Failed => "Failed",
            OutcomeStatus::TimedOut => "TimedOut",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a step-level failure, used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    ResourceUnavailable,
    /// Only reaches classification once the step's retry budget is spent.
    Transient,
    Timeout,
}

/// What the executor does after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    pub status: OutcomeStatus,
    pub compensate: bool,
}

/// Maps a failure and the number of steps already completed to the run's
/// terminal status and whether a compensation sweep is needed.
///
/// A sweep is only needed when something was actually completed. A
/// validation failure after earlier steps mutated state still compensates
/// them, but keeps the `Aborted` status.
pub fn classify(kind: ErrorKind, completed: usize) -> Disposition {
    let status = match kind {
        ErrorKind::Validation => OutcomeStatus::Aborted,
        ErrorKind::ResourceUnavailable | ErrorKind::Transient => OutcomeStatus::Failed,
        ErrorKind::Timeout => OutcomeStatus::TimedOut,
    };
    Disposition {
        status,
        compensate: completed > 0,
    }
}

/// Primary cause of a non-completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Another run holds the lease for the same entity.
    AlreadyInProgress { entity_id: EntityId },
    /// A step rejected the request.
    Validation { step: String, message: String },
    /// A step failed for a resource or exhausted-transient reason.
    ResourceUnavailable {
        step: String,
        message: String,
        attempts: u32,
    },
    /// The deadline passed before `pending_step` could start or finish retrying.
    DeadlineExceeded { pending_step: Option<String> },
}

impl FailureReason {
    /// Returns the name of the step the failure originated from, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            FailureReason::AlreadyInProgress { .. } => None,
            FailureReason::Validation { step, .. }
            | FailureReason::ResourceUnavailable { step, .. } => Some(step),
            FailureReason::DeadlineExceeded { pending_step } => pending_step.as_deref(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::AlreadyInProgress { entity_id } => {
                write!(f, "saga already in progress for {entity_id}")
            }
            FailureReason::Validation { step, message } => {
                write!(f, "step '{step}' rejected the request: {message}")
            }
            FailureReason::ResourceUnavailable {
                step,
                message,
                attempts,
            } => write!(f, "step '{step}' failed after {attempts} attempt(s): {message}"),
            FailureReason::DeadlineExceeded {
                pending_step: Some(step),
            } => write!(f, "deadline exceeded before step '{step}'"),
            FailureReason::DeadlineExceeded { pending_step: None } => {
                write!(f, "deadline exceeded")
            }
        }
    }
}

/// A compensating action that itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationError {
    pub step: String,
    pub message: String,
}

/// The complete result of one saga run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Name of the saga definition that ran.
    pub saga: String,
    /// The entity the run operated on.
    pub entity_id: EntityId,
    pub status: OutcomeStatus,
    /// Step names in the order they completed.
    pub completed_steps: Vec<String>,
    /// Step names in the order their compensation was attempted.
    pub compensated_steps: Vec<String>,
    pub failure_reason: Option<FailureReason>,
    /// Failed compensations; never the primary cause.
    pub compensation_errors: Vec<CompensationError>,
    /// Forward results keyed by step name.
    pub results: HashMap<String, serde_json::Value>,
    /// Journal of everything that happened during the run.
    pub events: Vec<SagaEvent>,
    pub duration: Duration,
}

impl Outcome {
    /// Returns true if every step completed.
    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    /// Returns true if the run completed and left nothing to clean up by hand.
    pub fn is_success(&self) -> bool {
        self.is_completed() && self.compensation_errors.is_empty()
    }

    /// Returns the forward result of a completed step.
    pub fn result(&self, step: &str) -> Option<&serde_json::Value> {
        self.results.get(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_before_any_step_aborts_without_compensation() {
        let d = classify(ErrorKind::Validation, 0);
        assert_eq!(d.status, OutcomeStatus::Aborted);
        assert!(!d.compensate);
    }

    #[test]
    fn test_validation_after_mutation_still_compensates() {
        let d = classify(ErrorKind::Validation, 2);
        assert_eq!(d.status, OutcomeStatus::Aborted);
        assert!(d.compensate);
    }

    #[test]
    fn test_resource_failure_compensates_completed_steps() {
        let d = classify(ErrorKind::ResourceUnavailable, 1);
        assert_eq!(d.status, OutcomeStatus::Failed);
        assert!(d.compensate);

        let first = classify(ErrorKind::ResourceUnavailable, 0);
        assert_eq!(first.status, OutcomeStatus::Failed);
        assert!(!first.compensate);
    }

    #[test]
    fn test_exhausted_transient_is_treated_as_resource_failure() {
        assert_eq!(
            classify(ErrorKind::Transient, 1),
            classify(ErrorKind::ResourceUnavailable, 1)
        );
    }

    #[test]
    fn test_timeout_maps_to_timed_out() {
        let d = classify(ErrorKind::Timeout, 2);
        assert_eq!(d.status, OutcomeStatus::TimedOut);
        assert!(d.compensate);
    }

    #[test]
    fn test_failure_reason_step() {
        let reason = FailureReason::ResourceUnavailable {
            step: "charge".to_string(),
            message: "declined".to_string(),
            attempts: 3,
        };
        assert_eq!(reason.step(), Some("charge"));
        assert_eq!(
            reason.to_string(),
            "step 'charge' failed after 3 attempt(s): declined"
        );

        let busy = FailureReason::AlreadyInProgress {
            entity_id: EntityId::new(),
        };
        assert_eq!(busy.step(), None);
    }

    #[test]
    fn test_failure_reason_serializes_with_kind_tag() {
        let reason = FailureReason::DeadlineExceeded {
            pending_step: Some("confirm".to_string()),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "deadline_exceeded");
        assert_eq!(json["pending_step"], "confirm");
    }
}
