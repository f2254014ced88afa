//! Order fulfillment built on the saga executor.
//!
//! The workflow validates an order, reserves stock for each line, charges
//! the customer, confirms the order and schedules follow-up jobs. Any
//! failure after stock is reserved undoes the completed steps in reverse.
//!
//! ```text
//! validate_order → reserve_inventory → charge_payment → confirm_order → schedule_follow_up
//!                        ↓ release          ↓ refund          ↓ reopen
//! ```

pub mod error;
pub mod order;
pub mod services;
pub mod steps;
pub mod value_objects;
pub mod workflow;

pub use error::{FulfillmentError, ServiceError};
pub use order::{Order, OrderError, OrderRef, OrderState};
pub use services::{
    InMemoryInventoryStore, InMemoryNotificationQueue, InMemoryOrderRepository,
    InMemoryPaymentGateway, InventoryStore, Job, NotificationQueue, OrderRepository,
    PaymentGateway,
};
pub use steps::ChargeReceipt;
pub use value_objects::{CustomerId, Money, OrderItem, ProductId};
pub use workflow::{FulfillmentServices, OrderFulfillment, order_fulfillment_saga};
