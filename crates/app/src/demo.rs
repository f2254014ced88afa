//! Seeds in-memory services and fulfills a batch of orders concurrently.

use std::sync::Arc;

use common::EntityId;
use fulfillment::{
    CustomerId, FulfillmentServices, InMemoryInventoryStore, InMemoryNotificationQueue,
    InMemoryOrderRepository, InMemoryPaymentGateway, Money, Order, OrderFulfillment, OrderItem,
};
use saga::{ExecutorConfig, Outcome, OutcomeStatus, SagaExecutor};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::AppError;

/// An order submitted by the demo, with a label for the logs.
#[derive(Debug, Clone)]
pub struct Submission {
    pub label: String,
    pub order_id: EntityId,
}

/// Outcome counts across a demo run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub completed: usize,
    pub aborted: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl Summary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut summary = Summary::default();
        for outcome in outcomes {
            match outcome.status {
                OutcomeStatus::Completed => summary.completed += 1,
                OutcomeStatus::Aborted => summary.aborted += 1,
                OutcomeStatus::Failed => summary.failed += 1,
                OutcomeStatus::TimedOut => summary.timed_out += 1,
            }
        }
        summary
    }
}

/// The demo's in-memory world.
pub struct Demo {
    pub orders: InMemoryOrderRepository,
    pub inventory: InMemoryInventoryStore,
    pub payments: InMemoryPaymentGateway,
    pub queue: InMemoryNotificationQueue,
    fulfillment: OrderFulfillment,
}

impl Demo {
    pub fn new(config: ExecutorConfig) -> Result<Self, AppError> {
        let orders = InMemoryOrderRepository::new();
        let inventory = InMemoryInventoryStore::new();
        let payments = InMemoryPaymentGateway::new();
        let queue = InMemoryNotificationQueue::new();

        let services = FulfillmentServices {
            orders: Arc::new(orders.clone()),
            inventory: Arc::new(inventory.clone()),
            payments: Arc::new(payments.clone()),
            notifications: Arc::new(queue.clone()),
        };
        let fulfillment = OrderFulfillment::new(SagaExecutor::in_memory(config), &services)?;

        Ok(Self {
            orders,
            inventory,
            payments,
            queue,
            fulfillment,
        })
    }

    /// Stocks the warehouse and creates `regular` fulfillable orders plus
    /// one empty order and one that cannot be fully reserved.
    pub fn seed(&self, regular: usize) -> Vec<Submission> {
        self.inventory.set_stock("SKU-001", 100);
        self.inventory.set_stock("SKU-002", 50);
        self.inventory.set_stock("SKU-003", 0);

        let mut submissions = Vec::with_capacity(regular + 2);
        for i in 1..=regular {
            let order = Order::new(CustomerId::new())
                .with_item(OrderItem::new("SKU-001", "Widget", 2, Money::from_cents(1000)))
                .with_item(OrderItem::new("SKU-002", "Gadget", 1, Money::from_cents(2500)));
            submissions.push(Submission {
                label: format!("order-{i}"),
                order_id: self.orders.insert(order),
            });
        }

        submissions.push(Submission {
            label: "empty-order".to_string(),
            order_id: self.orders.insert(Order::new(CustomerId::new())),
        });

        let sold_out = Order::new(CustomerId::new())
            .with_item(OrderItem::new("SKU-001", "Widget", 1, Money::from_cents(1000)))
            .with_item(OrderItem::new("SKU-003", "Gizmo", 1, Money::from_cents(9900)));
        submissions.push(Submission {
            label: "out-of-stock".to_string(),
            order_id: self.orders.insert(sold_out),
        });

        submissions
    }

    /// Fulfills every submission concurrently, submitting the first one twice.
    pub async fn run(&self, submissions: &[Submission]) -> Result<Vec<(String, Outcome)>, AppError> {
        let mut tasks = JoinSet::new();

        let duplicate = submissions.first().map(|s| Submission {
            label: format!("{}-duplicate", s.label),
            order_id: s.order_id,
        });
        for submission in submissions.iter().cloned().chain(duplicate) {
            let fulfillment = self.fulfillment.clone();
            tasks.spawn(async move {
                let outcome = fulfillment.fulfill(submission.order_id).await;
                (submission.label, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(result) = tasks.join_next().await {
            outcomes.push(result?);
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfillment::{OrderState, ProductId};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_demo_run() {
        let demo = Demo::new(ExecutorConfig::default()).unwrap();
        let submissions = demo.seed(3);
        assert_eq!(submissions.len(), 5);

        let outcomes = demo.run(&submissions).await.unwrap();
        assert_eq!(outcomes.len(), 6);

        let summary = Summary::from_outcomes(outcomes.iter().map(|(_, o)| o));
        assert_eq!(
            summary,
            Summary {
                completed: 3,
                aborted: 2,
                failed: 1,
                timed_out: 0,
            }
        );

        for submission in &submissions[..3] {
            assert_eq!(
                demo.orders.state_of(submission.order_id),
                Some(OrderState::Confirmed)
            );
        }
        assert_eq!(demo.payments.active_charges(), 3);
        assert_eq!(demo.inventory.available(&ProductId::new("SKU-001")), 94);
        assert_eq!(demo.inventory.available(&ProductId::new("SKU-003")), 0);
        assert_eq!(demo.queue.jobs().len(), 6);
    }

    #[test]
    fn test_summary_counts() {
        let summary = Summary::from_outcomes(std::iter::empty());
        assert_eq!(summary, Summary::default());
    }
}
