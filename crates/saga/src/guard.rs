//! Per-entity mutual exclusion for saga runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::EntityId;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Result, SagaError};

/// Grants at most one lease per entity at a time.
///
/// The executor only depends on this trait, so a distributed deployment can
/// swap the in-memory implementation for one backed by a distributed lock.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Acquires the lease for `entity_id`, waiting at most `wait`.
    ///
    /// `ttl` bounds how long the lease protects the entity if its holder
    /// never releases it; an expired lease may be taken over.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Busy`] if another holder still owns the lease
    /// once `wait` has elapsed. A zero `wait` fails immediately.
    async fn acquire(&self, entity_id: EntityId, wait: Duration, ttl: Duration) -> Result<Lease>;
}

/// An exclusive, time-bounded claim on one entity.
///
/// Released when dropped, so every exit path of the holder (including a
/// panic unwinding through it or its task being cancelled) gives it back.
pub struct Lease {
    entity_id: EntityId,
    acquired_at: Instant,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Lease {
    /// Creates a lease that runs `release` exactly once when given back.
    pub fn new(entity_id: EntityId, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            entity_id,
            acquired_at: Instant::now(),
            release: Some(Box::new(release)),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// How long the lease has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Gives the lease back explicitly.
    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("entity_id", &self.entity_id)
            .field("released", &self.release.is_none())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct LeaseMarker {
    token: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct GuardState {
    leases: Mutex<HashMap<EntityId, LeaseMarker>>,
    released: Notify,
    next_token: AtomicU64,
}

impl GuardState {
    fn leases(&self) -> MutexGuard<'_, HashMap<EntityId, LeaseMarker>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the new lease token, or the current holder's expiry.
    fn try_acquire(&self, entity_id: EntityId, ttl: Duration) -> std::result::Result<u64, Instant> {
        let now = Instant::now();
        let mut leases = self.leases();

        if let Some(marker) = leases.get(&entity_id) {
            if marker.expires_at > now {
                return Err(marker.expires_at);
            }
            tracing::warn!(%entity_id, "taking over expired lease");
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        leases.insert(
            entity_id,
            LeaseMarker {
                token,
                expires_at: now + ttl,
            },
        );
        Ok(token)
    }

    fn release(&self, entity_id: EntityId, token: u64) {
        {
            let mut leases = self.leases();
            // A lease that expired and was taken over must not evict the new holder
            if leases.get(&entity_id).is_some_and(|m| m.token == token) {
                leases.remove(&entity_id);
            }
        }
        self.released.notify_waiters();
    }
}

/// In-process guard backed by a single mutex-protected map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdempotencyGuard {
    state: Arc<GuardState>,
}

impl InMemoryIdempotencyGuard {
    /// Creates a new guard with no leases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if an unexpired lease exists for the entity.
    pub fn is_held(&self, entity_id: EntityId) -> bool {
        let now = Instant::now();
        self.state
            .leases()
            .get(&entity_id)
            .is_some_and(|m| m.expires_at > now)
    }

    /// Returns the number of unexpired leases.
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        self.state
            .leases()
            .values()
            .filter(|m| m.expires_at > now)
            .count()
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyGuard {
    async fn acquire(&self, entity_id: EntityId, wait: Duration, ttl: Duration) -> Result<Lease> {
        let wait_until = Instant::now() + wait;

        loop {
            // Register for wake-ups before checking, so a release between the
            // check and the wait is not missed.
            let notified = self.state.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.state.try_acquire(entity_id, ttl) {
                Ok(token) => {
                    let state = Arc::clone(&self.state);
                    return Ok(Lease::new(entity_id, move || {
                        state.release(entity_id, token)
                    }));
                }
                Err(holder_expires_at) => {
                    if Instant::now() >= wait_until {
                        return Err(SagaError::Busy { entity_id });
                    }
                    let wake_at = wait_until.min(holder_expires_at);
                    let _ = tokio::time::timeout_at(wake_at, notified).await;
                }
            }
        }
    }
}
