//! Error types for the fulfillment workflow.

use saga::{SagaError, StepError};
use thiserror::Error;

use crate::order::OrderError;

/// Errors returned by the external services the steps call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The request itself is invalid and retrying will not help.
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// The service refused the request (out of stock, card declined).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The service is down.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// A blip (timeout, rate limit) worth retrying.
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        ServiceError::Invalid(err.to_string())
    }
}

impl From<ServiceError> for StepError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Invalid(msg) => StepError::Validation(msg),
            ServiceError::Rejected(msg) | ServiceError::Unavailable(msg) => {
                StepError::ResourceUnavailable(msg)
            }
            ServiceError::Transient(msg) => StepError::Transient(msg),
        }
    }
}

/// Errors raised while assembling the fulfillment workflow.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Invalid saga definition: {0}")]
    Definition(#[from] SagaError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderState;

    #[test]
    fn test_service_error_maps_to_step_error() {
        let cases = [
            (ServiceError::Invalid("bad".into()), saga::ErrorKind::Validation),
            (
                ServiceError::Rejected("Insufficient stock".into()),
                saga::ErrorKind::ResourceUnavailable,
            ),
            (
                ServiceError::Unavailable("down".into()),
                saga::ErrorKind::ResourceUnavailable,
            ),
            (ServiceError::Transient("timeout".into()), saga::ErrorKind::Transient),
        ];

        for (service_error, kind) in cases {
            let step_error = StepError::from(service_error);
            assert_eq!(step_error.kind(), kind);
        }
    }

    #[test]
    fn test_message_survives_mapping() {
        let step_error = StepError::from(ServiceError::Rejected("Payment declined".into()));
        assert_eq!(step_error.message(), "Payment declined");
    }

    #[test]
    fn test_order_error_is_invalid() {
        let err = ServiceError::from(OrderError::InvalidTransition {
            state: OrderState::Cancelled,
            action: "confirm",
        });
        assert!(matches!(err, ServiceError::Invalid(_)));
    }
}
