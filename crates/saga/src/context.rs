//! Per-run state handed to every step.

use std::collections::HashMap;
use std::time::Duration;

use common::EntityId;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::error::StepError;

/// Carries the business entity, accumulated step results and the deadline
/// through one saga run.
///
/// Created by the caller, owned by the executor for the duration of the run.
/// Step results are written by the executor only; steps read them through
/// [`result`](Self::result) or [`result_as`](Self::result_as).
#[derive(Debug)]
pub struct ExecutionContext<T> {
    entity_id: EntityId,
    entity: T,
    data: HashMap<String, serde_json::Value>,
    deadline: Instant,
}

impl<T> ExecutionContext<T> {
    /// Creates a context with an absolute deadline.
    pub fn new(entity_id: EntityId, entity: T, deadline: Instant) -> Self {
        Self {
            entity_id,
            entity,
            data: HashMap::new(),
            deadline,
        }
    }

    /// Creates a context whose deadline is `timeout` from now.
    pub fn with_timeout(entity_id: EntityId, entity: T, timeout: Duration) -> Self {
        Self::new(entity_id, entity, Instant::now() + timeout)
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns the result produced by a completed step.
    pub fn result(&self, step: &str) -> Option<&serde_json::Value> {
        self.data.get(step)
    }

    /// Deserializes the result produced by a completed step.
    ///
    /// A missing result means the step did not run before the caller, which
    /// is reported as a resource failure of the calling step.
    pub fn result_as<R: DeserializeOwned>(&self, step: &str) -> Result<R, StepError> {
        let value = self
            .data
            .get(step)
            .ok_or_else(|| StepError::resource_unavailable(format!("no result from step '{step}'")))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            StepError::resource_unavailable(format!("unreadable result from step '{step}': {e}"))
        })
    }

    /// Returns all recorded results.
    pub fn results(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }

    pub(crate) fn record(&mut self, step: &str, value: serde_json::Value) {
        self.data.insert(step.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_tracking() {
        let ctx = ExecutionContext::with_timeout(EntityId::new(), (), Duration::from_secs(5));
        assert!(!ctx.is_expired());
        assert_eq!(ctx.remaining(), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_results_are_readable_by_later_steps() {
        let mut ctx = ExecutionContext::with_timeout(EntityId::new(), "order", Duration::from_secs(1));
        ctx.record("charge", json!("CH-0001"));

        assert_eq!(ctx.result("charge"), Some(&json!("CH-0001")));
        let charge_id: String = ctx.result_as("charge").unwrap();
        assert_eq!(charge_id, "CH-0001");
        assert_eq!(*ctx.entity(), "order");
    }

    #[tokio::test]
    async fn test_missing_result_is_resource_failure() {
        let ctx = ExecutionContext::with_timeout(EntityId::new(), (), Duration::from_secs(1));
        let err = ctx.result_as::<String>("charge").unwrap_err();
        assert!(matches!(err, StepError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_mistyped_result_is_resource_failure() {
        let mut ctx = ExecutionContext::with_timeout(EntityId::new(), (), Duration::from_secs(1));
        ctx.record("reserve", json!({"not": "a list"}));
        let err = ctx.result_as::<Vec<String>>("reserve").unwrap_err();
        assert!(err.message().contains("unreadable result"));
    }
}
