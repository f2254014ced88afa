//! Order repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::EntityId;

use crate::error::ServiceError;
use crate::order::{Order, OrderState};

/// Loads orders and records their confirmation.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get(&self, order_id: EntityId) -> Result<Option<Order>, ServiceError>;

    /// Marks an order as paid by `charge_id`.
    async fn confirm(&self, order_id: EntityId, charge_id: &str) -> Result<(), ServiceError>;

    /// Returns a confirmed order to draft.
    async fn reopen(&self, order_id: EntityId) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<EntityId, Order>,
    fail_on_confirm: bool,
}

/// In-memory order repository for tests and the demo.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryOrderState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryOrderState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an order, replacing any order with the same id.
    pub fn insert(&self, order: Order) -> EntityId {
        let id = order.id;
        self.write().orders.insert(id, order);
        id
    }

    /// Makes confirm calls fail as if the database were down.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.write().fail_on_confirm = fail;
    }

    pub fn order(&self, order_id: EntityId) -> Option<Order> {
        self.read().orders.get(&order_id).cloned()
    }

    pub fn state_of(&self, order_id: EntityId) -> Option<OrderState> {
        self.read().orders.get(&order_id).map(|o| o.state)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn get(&self, order_id: EntityId) -> Result<Option<Order>, ServiceError> {
        Ok(self.order(order_id))
    }

    #[tracing::instrument(skip(self))]
    async fn confirm(&self, order_id: EntityId, charge_id: &str) -> Result<(), ServiceError> {
        let mut state = self.write();

        if state.fail_on_confirm {
            return Err(ServiceError::Unavailable(
                "order database unavailable".to_string(),
            ));
        }

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| ServiceError::Invalid(format!("order {order_id} not found")))?;
        order.confirm(charge_id)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn reopen(&self, order_id: EntityId) -> Result<(), ServiceError> {
        let mut state = self.write();
        match state.orders.get_mut(&order_id) {
            Some(order) => Ok(order.reopen()?),
            None => Err(ServiceError::Invalid(format!("order {order_id} not found"))),
        }
    }
}
