//! External service traits and in-memory implementations used by the steps.

pub mod inventory;
pub mod notification;
pub mod orders;
pub mod payment;

pub use inventory::{InMemoryInventoryStore, InventoryStore};
pub use notification::{InMemoryNotificationQueue, Job, NotificationQueue};
pub use orders::{InMemoryOrderRepository, OrderRepository};
pub use payment::{InMemoryPaymentGateway, PaymentGateway};
