//! In-process saga executor.
//!
//! A saga is an ordered list of [`Step`]s, each with a forward action and a
//! compensating action. The [`SagaExecutor`] runs the steps of a
//! [`SagaDefinition`] in order against an [`ExecutionContext`]. If a step
//! fails, or the deadline passes, every step that already completed is
//! compensated in reverse completion order.
//!
//! Runs on the same entity are mutually exclusive through an
//! [`IdempotencyGuard`]; a duplicate submission is rejected with an
//! `Aborted` [`Outcome`] instead of being queued.
//!
//! Every run ends in exactly one [`Outcome`]: step failures, panics and
//! compensation errors are reported in it, never raised.

pub mod config;
pub mod context;
pub mod definition;
pub mod error;
pub mod events;
pub mod executor;
pub mod guard;
pub mod outcome;
pub mod run;
pub mod state;
pub mod step;

pub use config::ExecutorConfig;
pub use context::ExecutionContext;
pub use definition::{SagaDefinition, SagaDefinitionBuilder};
pub use error::{Result, SagaError, StepError};
pub use events::SagaEvent;
pub use executor::SagaExecutor;
pub use guard::{IdempotencyGuard, InMemoryIdempotencyGuard, Lease};
pub use outcome::{
    CompensationError, Disposition, ErrorKind, FailureReason, Outcome, OutcomeStatus, classify,
};
pub use run::SagaRun;
pub use state::SagaState;
pub use step::{RetryPolicy, Step};
