//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::EntityId;

use crate::error::ServiceError;
use crate::value_objects::{CustomerId, Money};

/// Captures and refunds payments.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges a customer for an order and returns the charge id.
    ///
    /// The order id doubles as the gateway's idempotency key: while a
    /// charge for the order is live, charging again returns it.
    async fn charge(
        &self,
        order_id: EntityId,
        customer_id: CustomerId,
        amount: Money,
    ) -> Result<String, ServiceError>;

    /// Refunds a charge. Refunding twice succeeds.
    async fn refund(&self, charge_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
struct Charge {
    order_id: EntityId,
    amount: Money,
    refunded: bool,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    charges: HashMap<String, Charge>,
    next_id: u32,
    decline: bool,
    transient_failures: u32,
    fail_on_refund: bool,
    charge_attempts: u32,
}

/// In-memory payment gateway for tests and the demo.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declines every charge.
    pub fn set_decline(&self, decline: bool) {
        self.write().decline = decline;
    }

    /// Fails the next `count` charge calls with a transient error.
    pub fn fail_next_charges(&self, count: u32) {
        self.write().transient_failures = count;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Returns the number of charges that have not been refunded.
    pub fn active_charges(&self) -> usize {
        self.read().charges.values().filter(|c| !c.refunded).count()
    }

    /// Returns the total amount currently captured.
    pub fn captured(&self) -> Money {
        self.read()
            .charges
            .values()
            .filter(|c| !c.refunded)
            .map(|c| c.amount)
            .sum()
    }

    pub fn is_refunded(&self, charge_id: &str) -> bool {
        self.read()
            .charges
            .get(charge_id)
            .is_some_and(|c| c.refunded)
    }

    /// Returns how many times `charge` was called, failures included.
    pub fn charge_attempts(&self) -> u32 {
        self.read().charge_attempts
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    #[tracing::instrument(skip(self, _customer_id))]
    async fn charge(
        &self,
        order_id: EntityId,
        _customer_id: CustomerId,
        amount: Money,
    ) -> Result<String, ServiceError> {
        let mut state = self.write();
        state.charge_attempts += 1;

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(ServiceError::Transient("gateway timeout".to_string()));
        }
        if state.decline {
            return Err(ServiceError::Rejected("Payment declined".to_string()));
        }
        if !amount.is_positive() {
            return Err(ServiceError::Invalid(format!(
                "charge amount must be positive, got {amount}"
            )));
        }

        if let Some((id, _)) = state
            .charges
            .iter()
            .find(|(_, c)| c.order_id == order_id && !c.refunded)
        {
            return Ok(id.clone());
        }

        state.next_id += 1;
        let charge_id = format!("CH-{:04}", state.next_id);
        state.charges.insert(
            charge_id.clone(),
            Charge {
                order_id,
                amount,
                refunded: false,
            },
        );
        Ok(charge_id)
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, charge_id: &str) -> Result<(), ServiceError> {
        let mut state = self.write();

        if state.fail_on_refund {
            return Err(ServiceError::Unavailable(
                "payment gateway unavailable".to_string(),
            ));
        }

        match state.charges.get_mut(charge_id) {
            Some(charge) => {
                charge.refunded = true;
                Ok(())
            }
            None => Err(ServiceError::Invalid(format!("unknown charge {charge_id}"))),
        }
    }
}
