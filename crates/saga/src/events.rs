//! Saga run journal events.

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::outcome::{ErrorKind, FailureReason};

/// Events that can occur during a saga run.
///
/// The executor records every transition as an event and derives the final
/// [`Outcome`](crate::Outcome) by folding them into a [`SagaRun`](crate::SagaRun).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// The run acquired its lease and started.
    SagaStarted(SagaStartedData),

    /// A step's forward action started.
    StepStarted(StepData),

    /// A forward attempt failed transiently and will be retried.
    StepRetried(StepRetriedData),

    /// A step's forward action completed successfully.
    StepCompleted(StepCompletedData),

    /// A conditional step decided not to run.
    StepSkipped(StepData),

    /// A step failed for good.
    StepFailed(StepFailedData),

    /// Compensation started for completed steps.
    CompensationStarted(CompensationData),

    /// A compensating action completed successfully.
    CompensationStepCompleted(StepData),

    /// A compensating action failed (recorded, sweep continues).
    CompensationStepFailed(CompensationFailedData),

    /// Every step completed.
    SagaCompleted(SagaCompletedData),

    /// The run was rejected for a business reason.
    SagaAborted(SagaEndedData),

    /// The run failed after compensation.
    SagaFailed(SagaEndedData),

    /// The deadline passed; compensation ran.
    SagaTimedOut(SagaEndedData),
}

impl SagaEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepRetried(_) => "StepRetried",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepSkipped(_) => "StepSkipped",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaAborted(_) => "SagaAborted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
            SagaEvent::SagaTimedOut(_) => "SagaTimedOut",
        }
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStartedData {
    /// Name of the saga definition.
    pub saga: String,
    /// The entity the run operates on.
    pub entity_id: EntityId,
    /// When the run started.
    pub started_at: DateTime<Utc>,
}

/// Data for events that only carry a step name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    /// The step name.
    pub step_name: String,
}

/// Data for StepRetried event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRetriedData {
    pub step_name: String,
    /// The attempt that failed (1-indexed).
    pub attempt: u32,
    pub error: String,
    /// Delay before the next attempt, in milliseconds.
    pub backoff_ms: u64,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step_name: String,
    /// Value produced by the forward action, readable by later steps.
    pub result: serde_json::Value,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step_name: String,
    pub kind: ErrorKind,
    /// Error message describing the failure.
    pub error: String,
    pub attempts: u32,
}

/// Data for CompensationStarted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationData {
    /// The step that triggered compensation, if a step failed.
    pub from_step: Option<String>,
}

/// Data for CompensationStepFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub step_name: String,
    pub error: String,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for the aborted, failed and timed-out terminal events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaEndedData {
    pub reason: FailureReason,
    pub ended_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(saga: impl Into<String>, entity_id: EntityId) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga: saga.into(),
            entity_id,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(step_name: impl Into<String>) -> Self {
        SagaEvent::StepStarted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn step_retried(
        step_name: impl Into<String>,
        attempt: u32,
        error: impl Into<String>,
        backoff_ms: u64,
    ) -> Self {
        SagaEvent::StepRetried(StepRetriedData {
            step_name: step_name.into(),
            attempt,
            error: error.into(),
            backoff_ms,
        })
    }

    pub fn step_completed(step_name: impl Into<String>, result: serde_json::Value) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            result,
        })
    }

    pub fn step_skipped(step_name: impl Into<String>) -> Self {
        SagaEvent::StepSkipped(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn step_failed(
        step_name: impl Into<String>,
        kind: ErrorKind,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            kind,
            error: error.into(),
            attempts,
        })
    }

    pub fn compensation_started(from_step: Option<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData { from_step })
    }

    pub fn compensation_step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn compensation_step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationStepFailed(CompensationFailedData {
            step_name: step_name.into(),
            error: error.into(),
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn saga_aborted(reason: FailureReason) -> Self {
        SagaEvent::SagaAborted(SagaEndedData {
            reason,
            ended_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: FailureReason) -> Self {
        SagaEvent::SagaFailed(SagaEndedData {
            reason,
            ended_at: Utc::now(),
        })
    }

    pub fn saga_timed_out(reason: FailureReason) -> Self {
        SagaEvent::SagaTimedOut(SagaEndedData {
            reason,
            ended_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type() {
        let entity_id = EntityId::new();

        assert_eq!(
            SagaEvent::saga_started("order_fulfillment", entity_id).event_type(),
            "SagaStarted"
        );
        assert_eq!(SagaEvent::step_started("reserve").event_type(), "StepStarted");
        assert_eq!(
            SagaEvent::step_retried("charge", 1, "timeout", 100).event_type(),
            "StepRetried"
        );
        assert_eq!(
            SagaEvent::step_completed("reserve", json!(["RES-0001"])).event_type(),
            "StepCompleted"
        );
        assert_eq!(SagaEvent::step_skipped("notify").event_type(), "StepSkipped");
        assert_eq!(
            SagaEvent::step_failed("charge", ErrorKind::ResourceUnavailable, "declined", 1)
                .event_type(),
            "StepFailed"
        );
        assert_eq!(
            SagaEvent::compensation_started(Some("charge".into())).event_type(),
            "CompensationStarted"
        );
        assert_eq!(
            SagaEvent::compensation_step_completed("reserve").event_type(),
            "CompensationStepCompleted"
        );
        assert_eq!(
            SagaEvent::compensation_step_failed("reserve", "service down").event_type(),
            "CompensationStepFailed"
        );
        assert_eq!(SagaEvent::saga_completed().event_type(), "SagaCompleted");
        assert_eq!(
            SagaEvent::saga_aborted(FailureReason::AlreadyInProgress { entity_id }).event_type(),
            "SagaAborted"
        );
        assert_eq!(
            SagaEvent::saga_timed_out(FailureReason::DeadlineExceeded { pending_step: None })
                .event_type(),
            "SagaTimedOut"
        );
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let event = SagaEvent::step_completed("charge", json!("CH-0001"));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "StepCompleted");
        assert_eq!(value["data"]["step_name"], "charge");
        assert_eq!(value["data"]["result"], "CH-0001");
    }

    #[test]
    fn test_saga_failed_keeps_structured_reason() {
        let reason = FailureReason::ResourceUnavailable {
            step: "charge".to_string(),
            message: "Payment declined".to_string(),
            attempts: 1,
        };
        let event = SagaEvent::saga_failed(reason.clone());

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: SagaEvent = serde_json::from_str(&json).unwrap();

        if let SagaEvent::SagaFailed(data) = deserialized {
            assert_eq!(data.reason, reason);
        } else {
            panic!("Expected SagaFailed event");
        }
    }
}
