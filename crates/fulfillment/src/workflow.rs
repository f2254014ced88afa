//! Order fulfillment saga wiring.

use std::sync::Arc;
use std::time::Duration;

use common::EntityId;
use saga::{ExecutionContext, Outcome, SagaDefinition, SagaExecutor};

use crate::error::FulfillmentError;
use crate::order::OrderRef;
use crate::services::{InventoryStore, NotificationQueue, OrderRepository, PaymentGateway};
use crate::steps::{ChargePayment, ConfirmOrder, ReserveInventory, ScheduleFollowUp, ValidateOrder};

/// The saga name reported in outcomes and logs.
pub const SAGA_NAME: &str = "order_fulfillment";

pub const STEP_VALIDATE_ORDER: &str = "validate_order";
pub const STEP_RESERVE_INVENTORY: &str = "reserve_inventory";
pub const STEP_CHARGE_PAYMENT: &str = "charge_payment";
pub const STEP_CONFIRM_ORDER: &str = "confirm_order";
pub const STEP_SCHEDULE_FOLLOW_UP: &str = "schedule_follow_up";

pub const ORDER_CONFIRMATION_EMAIL_JOB: &str = "order_confirmation_email";
pub const FULFILLMENT_DISPATCH_JOB: &str = "fulfillment_dispatch";

/// The external services the fulfillment steps call.
#[derive(Clone)]
pub struct FulfillmentServices {
    pub orders: Arc<dyn OrderRepository>,
    pub inventory: Arc<dyn InventoryStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifications: Arc<dyn NotificationQueue>,
}

/// Builds the order fulfillment saga definition.
pub fn order_fulfillment_saga(
    services: &FulfillmentServices,
) -> Result<SagaDefinition<OrderRef>, FulfillmentError> {
    let definition = SagaDefinition::builder(SAGA_NAME)
        .step(ValidateOrder::new(services.orders.clone()))
        .step(ReserveInventory::new(services.inventory.clone()))
        .step(ChargePayment::new(services.payments.clone()))
        .step(ConfirmOrder::new(services.orders.clone()))
        .step(ScheduleFollowUp::new(services.notifications.clone()))
        .build()?;
    Ok(definition)
}

/// Runs the order fulfillment saga for individual orders.
#[derive(Clone)]
pub struct OrderFulfillment {
    executor: SagaExecutor,
    definition: SagaDefinition<OrderRef>,
    timeout: Duration,
}

impl OrderFulfillment {
    /// Creates a runner using the executor's default timeout.
    pub fn new(
        executor: SagaExecutor,
        services: &FulfillmentServices,
    ) -> Result<Self, FulfillmentError> {
        let timeout = executor.config().default_timeout;
        Ok(Self {
            executor,
            definition: order_fulfillment_saga(services)?,
            timeout,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn definition(&self) -> &SagaDefinition<OrderRef> {
        &self.definition
    }

    /// Fulfills one order.
    #[tracing::instrument(skip(self), fields(saga = SAGA_NAME))]
    pub async fn fulfill(&self, order_id: EntityId) -> Outcome {
        let ctx = ExecutionContext::with_timeout(order_id, OrderRef::new(order_id), self.timeout);
        self.executor.run(&self.definition, ctx).await
    }
}

impl std::fmt::Debug for OrderFulfillment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderFulfillment")
            .field("definition", &self.definition)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
