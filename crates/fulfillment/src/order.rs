//! Orders as seen by the fulfillment workflow.

use chrono::{DateTime, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value_objects::{CustomerId, Money, OrderItem, ProductId};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Draft ──► Confirmed
///   ▲           │
///   └─ reopen ──┘
/// Draft ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    /// Submitted but not yet fulfilled.
    #[default]
    Draft,
    /// Paid and confirmed (terminal for fulfillment).
    Confirmed,
    /// Cancelled by the customer (terminal).
    Cancelled,
}

impl OrderState {
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderState::Draft)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Draft => "Draft",
            OrderState::Confirmed => "Confirmed",
            OrderState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by invalid order transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Cannot {action} order in {state} state")]
    InvalidTransition {
        state: OrderState,
        action: &'static str,
    },

    #[error("Order is already confirmed with charge {0}")]
    ChargeMismatch(String),
}

/// An order awaiting fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: EntityId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub state: OrderState,
    /// Charge that paid for the order, set on confirmation.
    pub charge_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates an empty draft order.
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            id: EntityId::new(),
            customer_id,
            items: Vec::new(),
            state: OrderState::Draft,
            charge_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item: OrderItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the sum of all line totals.
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Returns the quantity ordered per product, in order of first appearance.
    ///
    /// Lines for the same product are merged so stock is reserved for every unit.
    pub fn quantities_by_product(&self) -> Vec<(ProductId, u32)> {
        let mut quantities: Vec<(ProductId, u32)> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match quantities.iter_mut().find(|(id, _)| *id == item.product_id) {
                Some((_, quantity)) => *quantity = quantity.saturating_add(item.quantity),
                None => quantities.push((item.product_id.clone(), item.quantity)),
            }
        }
        quantities
    }

    /// Confirms the order as paid by `charge_id`.
    ///
    /// Confirming twice with the same charge is a no-op.
    pub fn confirm(&mut self, charge_id: &str) -> Result<(), OrderError> {
        match (self.state, self.charge_id.as_deref()) {
            (OrderState::Confirmed, Some(existing)) if existing == charge_id => Ok(()),
            (OrderState::Confirmed, Some(existing)) => {
                Err(OrderError::ChargeMismatch(existing.to_string()))
            }
            (state, _) if !state.can_confirm() => Err(OrderError::InvalidTransition {
                state,
                action: "confirm",
            }),
            _ => {
                self.state = OrderState::Confirmed;
                self.charge_id = Some(charge_id.to_string());
                Ok(())
            }
        }
    }

    /// Returns a confirmed order to draft. A draft order is left unchanged.
    pub fn reopen(&mut self) -> Result<(), OrderError> {
        match self.state {
            OrderState::Draft => Ok(()),
            OrderState::Confirmed => {
                self.state = OrderState::Draft;
                self.charge_id = None;
                Ok(())
            }
            OrderState::Cancelled => Err(OrderError::InvalidTransition {
                state: self.state,
                action: "reopen",
            }),
        }
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.state != OrderState::Draft {
            return Err(OrderError::InvalidTransition {
                state: self.state,
                action: "cancel",
            });
        }
        self.state = OrderState::Cancelled;
        Ok(())
    }
}

/// The entity a fulfillment run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    pub order_id: EntityId,
    pub submitted_at: DateTime<Utc>,
}

impl OrderRef {
    pub fn new(order_id: EntityId) -> Self {
        Self {
            order_id,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(CustomerId::new())
            .with_item(OrderItem::new("SKU-001", "Widget", 2, Money::from_cents(1000)))
            .with_item(OrderItem::new("SKU-002", "Gadget", 1, Money::from_cents(2500)))
    }

    #[test]
    fn test_total() {
        assert_eq!(order().total(), Money::from_cents(4500));
        assert_eq!(Order::new(CustomerId::new()).total(), Money::zero());
    }

    #[test]
    fn test_quantities_by_product_merges_repeated_lines() {
        let order = order()
            .with_item(OrderItem::new("SKU-001", "Widget", 3, Money::from_cents(1000)));

        assert_eq!(
            order.quantities_by_product(),
            vec![(ProductId::from("SKU-001"), 5), (ProductId::from("SKU-002"), 1)]
        );
    }

    #[test]
    fn test_confirm_then_reopen() {
        let mut order = order();
        order.confirm("CH-0001").unwrap();
        assert_eq!(order.state, OrderState::Confirmed);
        assert_eq!(order.charge_id.as_deref(), Some("CH-0001"));

        order.reopen().unwrap();
        assert_eq!(order.state, OrderState::Draft);
        assert!(order.charge_id.is_none());

        // Reopening a draft is harmless
        order.reopen().unwrap();
        assert_eq!(order.state, OrderState::Draft);
    }

    #[test]
    fn test_confirm_is_idempotent_for_same_charge() {
        let mut order = order();
        order.confirm("CH-0001").unwrap();
        order.confirm("CH-0001").unwrap();
        assert_eq!(
            order.confirm("CH-0002"),
            Err(OrderError::ChargeMismatch("CH-0001".to_string()))
        );
    }

    #[test]
    fn test_cancelled_order_cannot_be_confirmed() {
        let mut order = order();
        order.cancel().unwrap();
        let err = order.confirm("CH-0001").unwrap_err();
        assert_eq!(err.to_string(), "Cannot confirm order in Cancelled state");
        assert!(order.reopen().is_err());
    }
}
