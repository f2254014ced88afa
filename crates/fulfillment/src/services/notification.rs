//! Background job queue trait and in-memory implementation.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// A unit of follow-up work handed to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub kind: String,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Fire-and-forget job queue.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryQueueState {
    jobs: Vec<Job>,
    fail_on_enqueue: bool,
}

/// In-memory queue that keeps every accepted job.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationQueue {
    state: Arc<RwLock<InMemoryQueueState>>,
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryQueueState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryQueueState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_on_enqueue(&self, fail: bool) {
        self.write().fail_on_enqueue = fail;
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.read().jobs.clone()
    }

    pub fn jobs_of_kind(&self, kind: &str) -> usize {
        self.read().jobs.iter().filter(|j| j.kind == kind).count()
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn enqueue(&self, job: Job) -> Result<(), ServiceError> {
        let mut state = self.write();
        if state.fail_on_enqueue {
            return Err(ServiceError::Unavailable("queue unavailable".to_string()));
        }
        state.jobs.push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue() {
        let queue = InMemoryNotificationQueue::new();
        queue
            .enqueue(Job::new("order_confirmation_email", json!({"order": 1})))
            .await
            .unwrap();
        queue
            .enqueue(Job::new("fulfillment_dispatch", json!({"order": 1})))
            .await
            .unwrap();

        assert_eq!(queue.jobs().len(), 2);
        assert_eq!(queue.jobs_of_kind("fulfillment_dispatch"), 1);
    }

    #[tokio::test]
    async fn test_fail_on_enqueue() {
        let queue = InMemoryNotificationQueue::new();
        queue.set_fail_on_enqueue(true);

        let result = queue.enqueue(Job::new("x", json!(null))).await;

        assert!(result.is_err());
        assert!(queue.jobs().is_empty());
    }
}
