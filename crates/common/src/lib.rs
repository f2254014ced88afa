//! Shared types for the saga workspace.

mod types;

pub use types::EntityId;
