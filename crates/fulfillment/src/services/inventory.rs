//! Inventory store trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::EntityId;

use crate::error::ServiceError;
use crate::value_objects::ProductId;

/// Stock reservations keyed by reservation id.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reserves `quantity` units of a product for an order.
    ///
    /// Reserving the same product for the same order again returns the
    /// existing reservation id without taking more stock.
    async fn reserve(
        &self,
        order_id: EntityId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<String, ServiceError>;

    /// Releases a reservation. Releasing an unknown id succeeds.
    async fn release(&self, reservation_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
struct Reservation {
    order_id: EntityId,
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<ProductId, u32>,
    reservations: HashMap<String, Reservation>,
    next_id: u32,
    fail_on_reserve: bool,
    fail_on_release: bool,
}

/// In-memory inventory store for tests and the demo.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryInventoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the available (unreserved) stock for a product.
    pub fn set_stock(&self, product_id: impl Into<ProductId>, quantity: u32) {
        self.write().stock.insert(product_id.into(), quantity);
    }

    /// Makes every reserve call fail as if the store were down.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.write().fail_on_reserve = fail;
    }

    pub fn set_fail_on_release(&self, fail: bool) {
        self.write().fail_on_release = fail;
    }

    /// Returns the unreserved stock for a product.
    pub fn available(&self, product_id: &ProductId) -> u32 {
        self.read().stock.get(product_id).copied().unwrap_or(0)
    }

    /// Returns the number of active reservations.
    pub fn reservation_count(&self) -> usize {
        self.read().reservations.len()
    }

    /// Returns the number of active reservations held by an order.
    pub fn reservations_for(&self, order_id: EntityId) -> usize {
        self.read()
            .reservations
            .values()
            .filter(|r| r.order_id == order_id)
            .count()
    }

    pub fn has_reservation(&self, reservation_id: &str) -> bool {
        self.read().reservations.contains_key(reservation_id)
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    #[tracing::instrument(skip(self, product_id), fields(product = %product_id))]
    async fn reserve(
        &self,
        order_id: EntityId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<String, ServiceError> {
        let mut state = self.write();

        if state.fail_on_reserve {
            return Err(ServiceError::Unavailable(
                "inventory store unavailable".to_string(),
            ));
        }

        if let Some((id, _)) = state
            .reservations
            .iter()
            .find(|(_, r)| r.order_id == order_id && &r.product_id == product_id)
        {
            return Ok(id.clone());
        }

        let available = state.stock.get(product_id).copied().unwrap_or(0);
        if available < quantity {
            return Err(ServiceError::Rejected(format!(
                "Insufficient stock for {product_id}: requested {quantity}, available {available}"
            )));
        }
        state.stock.insert(product_id.clone(), available - quantity);

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state.reservations.insert(
            reservation_id.clone(),
            Reservation {
                order_id,
                product_id: product_id.clone(),
                quantity,
            },
        );
        tracing::debug!(%reservation_id, "stock reserved");

        Ok(reservation_id)
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self, reservation_id: &str) -> Result<(), ServiceError> {
        let mut state = self.write();

        if state.fail_on_release {
            return Err(ServiceError::Unavailable(
                "inventory store unavailable".to_string(),
            ));
        }

        if let Some(reservation) = state.reservations.remove(reservation_id) {
            *state.stock.entry(reservation.product_id).or_insert(0) += reservation.quantity;
        }
        Ok(())
    }
}
