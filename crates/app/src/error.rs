//! Demo runner error types.

use fulfillment::FulfillmentError;
use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] BuildError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error("Fulfillment task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
