//! Saga error types.

use common::EntityId;
use thiserror::Error;

use crate::outcome::ErrorKind;

/// Errors raised while assembling a saga or acquiring an entity lease.
///
/// Step failures never surface as `SagaError`; they are folded into the
/// run's [`Outcome`](crate::Outcome).
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step was registered with an empty name.
    #[error("Saga '{saga}' has a step with an empty name")]
    EmptyStepName { saga: String },

    /// Two steps in one definition share a name.
    #[error("Saga '{saga}' already has a step named '{step}'")]
    DuplicateStep { saga: String, step: String },

    /// A definition was built without any steps.
    #[error("Saga '{0}' has no steps")]
    NoSteps(String),

    /// Another run already holds the lease for this entity.
    #[error("Entity {entity_id} already has a saga in progress")]
    Busy { entity_id: EntityId },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// Failure returned by a step's forward or compensating action.
///
/// The variant decides how the executor reacts: validation failures abort,
/// resource failures trigger compensation, and transient failures are
/// retried within the step's [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// The operation should never have been attempted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A recoverable business or resource failure (insufficient stock, declined card).
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A network or timeout class failure, eligible for retry.
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl StepError {
    pub fn validation(message: impl Into<String>) -> Self {
        StepError::Validation(message.into())
    }

    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        StepError::ResourceUnavailable(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        StepError::Transient(message.into())
    }

    /// Returns the classification kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Validation(_) => ErrorKind::Validation,
            StepError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            StepError::Transient(_) => ErrorKind::Transient,
        }
    }

    /// Returns the message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            StepError::Validation(m) | StepError::ResourceUnavailable(m) | StepError::Transient(m) => m,
        }
    }

    /// Returns true if the executor may retry the failed attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(StepError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            StepError::resource_unavailable("x").kind(),
            ErrorKind::ResourceUnavailable
        );
        assert_eq!(StepError::transient("x").kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(StepError::transient("timeout").is_retryable());
        assert!(!StepError::validation("empty").is_retryable());
        assert!(!StepError::resource_unavailable("declined").is_retryable());
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = StepError::resource_unavailable("Insufficient stock");
        assert_eq!(err.to_string(), "Resource unavailable: Insufficient stock");
        assert_eq!(err.message(), "Insufficient stock");
    }

    #[test]
    fn test_busy_display() {
        let entity_id = EntityId::new();
        let err = SagaError::Busy { entity_id };
        assert_eq!(
            err.to_string(),
            format!("Entity {entity_id} already has a saga in progress")
        );
    }
}
