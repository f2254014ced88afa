//! The five steps of the order fulfillment saga.
//!
//! Each step talks to exactly one external service and reads what it needs
//! from earlier steps' results in the execution context.

use std::sync::Arc;

use async_trait::async_trait;
use saga::{ExecutionContext, RetryPolicy, Step, StepError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::order::{Order, OrderRef, OrderState};
use crate::services::{InventoryStore, Job, NotificationQueue, OrderRepository, PaymentGateway};
use crate::value_objects::Money;
use crate::workflow::{
    FULFILLMENT_DISPATCH_JOB, ORDER_CONFIRMATION_EMAIL_JOB, STEP_CHARGE_PAYMENT,
    STEP_CONFIRM_ORDER, STEP_RESERVE_INVENTORY, STEP_SCHEDULE_FOLLOW_UP, STEP_VALIDATE_ORDER,
};

/// Result of [`ChargePayment`], read back by later steps and by its own
/// compensation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub charge_id: String,
    pub amount: Money,
}

fn encode<V: Serialize>(value: &V) -> Result<serde_json::Value, StepError> {
    serde_json::to_value(value)
        .map_err(|e| StepError::resource_unavailable(format!("could not encode step result: {e}")))
}

/// Loads the order and rejects ones that must not be fulfilled.
///
/// Produces a snapshot of the order for the following steps.
pub struct ValidateOrder {
    orders: Arc<dyn OrderRepository>,
}

impl ValidateOrder {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl Step<OrderRef> for ValidateOrder {
    fn name(&self) -> &str {
        STEP_VALIDATE_ORDER
    }

    async fn forward(&self, ctx: &ExecutionContext<OrderRef>) -> Result<serde_json::Value, StepError> {
        let order_id = ctx.entity().order_id;
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| StepError::validation(format!("order {order_id} not found")))?;

        if order.state != OrderState::Draft {
            return Err(StepError::validation("order already processed"));
        }
        if order.is_empty() {
            return Err(StepError::validation("order is empty"));
        }

        encode(&order)
    }
}

/// Reserves stock for every line of the order.
pub struct ReserveInventory {
    inventory: Arc<dyn InventoryStore>,
}

impl ReserveInventory {
    pub fn new(inventory: Arc<dyn InventoryStore>) -> Self {
        Self { inventory }
    }

    async fn release_all(&self, reservation_ids: &[String]) -> Result<(), StepError> {
        let mut first_error = None;
        for id in reservation_ids.iter().rev() {
            if let Err(error) = self.inventory.release(id).await {
                tracing::warn!(reservation_id = %id, %error, "failed to release reservation");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Step<OrderRef> for ReserveInventory {
    fn name(&self) -> &str {
        STEP_RESERVE_INVENTORY
    }

    async fn forward(&self, ctx: &ExecutionContext<OrderRef>) -> Result<serde_json::Value, StepError> {
        let order: Order = ctx.result_as(STEP_VALIDATE_ORDER)?;
        let quantities = order.quantities_by_product();
        let mut reserved = Vec::with_capacity(quantities.len());

        for (product_id, quantity) in &quantities {
            match self.inventory.reserve(order.id, product_id, *quantity).await {
                Ok(reservation_id) => reserved.push(reservation_id),
                Err(error) => {
                    // The executor only compensates completed steps, so undo
                    // the lines reserved so far here
                    if let Err(release_error) = self.release_all(&reserved).await {
                        tracing::warn!(%release_error, "partial reservation left behind");
                    }
                    return Err(error.into());
                }
            }
        }

        encode(&reserved)
    }

    async fn compensate(&self, ctx: &ExecutionContext<OrderRef>) -> Result<(), StepError> {
        let reserved: Vec<String> = ctx.result_as(STEP_RESERVE_INVENTORY)?;
        self.release_all(&reserved).await
    }
}

/// Charges the order total to the customer.
pub struct ChargePayment {
    payments: Arc<dyn PaymentGateway>,
    retry: RetryPolicy,
}

impl ChargePayment {
    pub fn new(payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            payments,
            retry: RetryPolicy::standard(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Step<OrderRef> for ChargePayment {
    fn name(&self) -> &str {
        STEP_CHARGE_PAYMENT
    }

    async fn forward(&self, ctx: &ExecutionContext<OrderRef>) -> Result<serde_json::Value, StepError> {
        let order: Order = ctx.result_as(STEP_VALIDATE_ORDER)?;
        let amount = order.total();
        let charge_id = self
            .payments
            .charge(order.id, order.customer_id, amount)
            .await?;

        encode(&ChargeReceipt { charge_id, amount })
    }

    async fn compensate(&self, ctx: &ExecutionContext<OrderRef>) -> Result<(), StepError> {
        let receipt: ChargeReceipt = ctx.result_as(STEP_CHARGE_PAYMENT)?;
        self.payments.refund(&receipt.charge_id).await?;
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

/// Marks the order as paid.
pub struct ConfirmOrder {
    orders: Arc<dyn OrderRepository>,
}

impl ConfirmOrder {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl Step<OrderRef> for ConfirmOrder {
    fn name(&self) -> &str {
        STEP_CONFIRM_ORDER
    }

    async fn forward(&self, ctx: &ExecutionContext<OrderRef>) -> Result<serde_json::Value, StepError> {
        let receipt: ChargeReceipt = ctx.result_as(STEP_CHARGE_PAYMENT)?;
        self.orders
            .confirm(ctx.entity().order_id, &receipt.charge_id)
            .await?;

        Ok(json!({ "state": OrderState::Confirmed, "charge_id": receipt.charge_id }))
    }

    async fn compensate(&self, ctx: &ExecutionContext<OrderRef>) -> Result<(), StepError> {
        self.orders.reopen(ctx.entity().order_id).await?;
        Ok(())
    }
}

/// Queues the confirmation email and the warehouse dispatch.
///
/// Queue failures are logged and skipped: the order is already paid and
/// confirmed, and follow-up work can be rescheduled.
pub struct ScheduleFollowUp {
    queue: Arc<dyn NotificationQueue>,
}

impl ScheduleFollowUp {
    pub fn new(queue: Arc<dyn NotificationQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Step<OrderRef> for ScheduleFollowUp {
    fn name(&self) -> &str {
        STEP_SCHEDULE_FOLLOW_UP
    }

    async fn forward(&self, ctx: &ExecutionContext<OrderRef>) -> Result<serde_json::Value, StepError> {
        let order: Order = ctx.result_as(STEP_VALIDATE_ORDER)?;
        let receipt: ChargeReceipt = ctx.result_as(STEP_CHARGE_PAYMENT)?;
        let payload = json!({
            "order_id": order.id,
            "customer_id": order.customer_id,
            "charge_id": receipt.charge_id,
            "amount": receipt.amount,
            "submitted_at": ctx.entity().submitted_at,
        });

        let mut scheduled = Vec::new();
        for kind in [ORDER_CONFIRMATION_EMAIL_JOB, FULFILLMENT_DISPATCH_JOB] {
            match self.queue.enqueue(Job::new(kind, payload.clone())).await {
                Ok(()) => scheduled.push(kind),
                Err(error) => {
                    tracing::warn!(job = kind, %error, "could not schedule follow-up");
                    metrics::counter!("fulfillment_follow_up_failures_total").increment(1);
                }
            }
        }

        Ok(json!(scheduled))
    }
}
