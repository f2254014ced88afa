//! Saga executor: runs a definition against a context and compensates on failure.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use common::EntityId;
use futures_util::FutureExt;
use tokio::time::Instant;

use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::definition::SagaDefinition;
use crate::error::{Result, StepError};
use crate::events::SagaEvent;
use crate::guard::{IdempotencyGuard, InMemoryIdempotencyGuard, Lease};
use crate::outcome::{ErrorKind, FailureReason, Outcome, OutcomeStatus, classify};
use crate::run::SagaRun;
use crate::step::Step;

/// Why the forward phase stopped early.
struct StepFailure {
    kind: ErrorKind,
    reason: FailureReason,
}

/// Runs saga definitions to completion, one entity at a time.
///
/// Steps run sequentially on the caller's task. Runs for different entities
/// may execute concurrently; the only state they share is the guard.
#[derive(Clone)]
pub struct SagaExecutor {
    guard: Arc<dyn IdempotencyGuard>,
    config: ExecutorConfig,
}

impl SagaExecutor {
    /// Creates an executor with the given guard.
    pub fn new(guard: impl IdempotencyGuard + 'static, config: ExecutorConfig) -> Self {
        Self {
            guard: Arc::new(guard),
            config,
        }
    }

    /// Creates an executor sharing a guard with other executors.
    pub fn with_shared_guard(guard: Arc<dyn IdempotencyGuard>, config: ExecutorConfig) -> Self {
        Self { guard, config }
    }

    /// Creates an executor with an in-process guard.
    pub fn in_memory(config: ExecutorConfig) -> Self {
        Self::new(InMemoryIdempotencyGuard::new(), config)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Builds a context whose deadline is the configured default timeout.
    pub fn context<T>(&self, entity_id: EntityId, entity: T) -> ExecutionContext<T> {
        ExecutionContext::with_timeout(entity_id, entity, self.config.default_timeout)
    }

    /// Executes a saga for the context's entity.
    ///
    /// Never fails and never panics because of a step: every failure is
    /// reported through the returned [`Outcome`].
    #[tracing::instrument(
        skip_all,
        fields(saga = %definition.name(), entity_id = %ctx.entity_id())
    )]
    pub async fn run<T>(&self, definition: &SagaDefinition<T>, mut ctx: ExecutionContext<T>) -> Outcome
    where
        T: Send + Sync,
    {
        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();
        let entity_id = ctx.entity_id();
        let mut run = SagaRun::default();

        match self.acquire(&ctx).await {
            Ok(lease) => {
                self.execute(definition, &mut ctx, &mut run).await;
                lease.release();
            }
            Err(error) => {
                tracing::warn!(%error, "saga rejected");
                run.record(SagaEvent::saga_aborted(FailureReason::AlreadyInProgress {
                    entity_id,
                }));
            }
        }

        let outcome = run.into_outcome(definition.name(), entity_id, started.elapsed());
        record_metrics(&outcome);
        outcome
    }

    /// The lease outlives the deadline by the configured grace so the
    /// compensation sweep stays protected.
    async fn acquire<T>(&self, ctx: &ExecutionContext<T>) -> Result<Lease> {
        let remaining = ctx.remaining();
        let wait = self.config.lock_wait_timeout.min(remaining);
        let ttl = remaining + self.config.lease_grace;
        self.guard.acquire(ctx.entity_id(), wait, ttl).await
    }

    async fn execute<T>(
        &self,
        definition: &SagaDefinition<T>,
        ctx: &mut ExecutionContext<T>,
        run: &mut SagaRun,
    ) where
        T: Send + Sync,
    {
        run.record(SagaEvent::saga_started(definition.name(), ctx.entity_id()));

        let Some(failure) = self.run_steps(definition, ctx, run).await else {
            run.record(SagaEvent::saga_completed());
            return;
        };

        let disposition = classify(failure.kind, run.completed_steps().len());
        if disposition.compensate {
            let from_step = failure.reason.step().map(str::to_string);
            self.compensate(definition, ctx, run, from_step).await;
        }

        let event = match disposition.status {
            OutcomeStatus::Aborted => SagaEvent::saga_aborted(failure.reason),
            OutcomeStatus::TimedOut => SagaEvent::saga_timed_out(failure.reason),
            OutcomeStatus::Failed | OutcomeStatus::Completed => {
                SagaEvent::saga_failed(failure.reason)
            }
        };
        run.record(event);
    }

    /// Runs steps in definition order until one fails or the deadline passes.
    async fn run_steps<T>(
        &self,
        definition: &SagaDefinition<T>,
        ctx: &mut ExecutionContext<T>,
        run: &mut SagaRun,
    ) -> Option<StepFailure>
    where
        T: Send + Sync,
    {
        for step in definition.steps() {
            let name = step.name();

            if ctx.is_expired() {
                tracing::warn!(step = name, "deadline exceeded, not starting step");
                return Some(StepFailure {
                    kind: ErrorKind::Timeout,
                    reason: FailureReason::DeadlineExceeded {
                        pending_step: Some(name.to_string()),
                    },
                });
            }

            match guarded_should_run(step.as_ref(), ctx) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(step = name, "saga step skipped");
                    run.record(SagaEvent::step_skipped(name));
                    continue;
                }
                Err(error) => {
                    let kind = error.kind();
                    tracing::warn!(step = name, %error, "saga step condition failed");
                    run.record(SagaEvent::step_failed(name, kind, error.message(), 0));
                    return Some(StepFailure {
                        kind,
                        reason: FailureReason::ResourceUnavailable {
                            step: name.to_string(),
                            message: error.message().to_string(),
                            attempts: 0,
                        },
                    });
                }
            }

            tracing::info!(step = name, "saga step started");
            run.record(SagaEvent::step_started(name));

            match self.forward_with_retry(step.as_ref(), ctx, run).await {
                Ok(value) => {
                    ctx.record(name, value.clone());
                    run.record(SagaEvent::step_completed(name, value));
                    tracing::info!(step = name, "saga step completed");
                }
                Err(failure) => return Some(failure),
            }
        }
        None
    }

    async fn forward_with_retry<T>(
        &self,
        step: &dyn Step<T>,
        ctx: &ExecutionContext<T>,
        run: &mut SagaRun,
    ) -> std::result::Result<serde_json::Value, StepFailure>
    where
        T: Send + Sync,
    {
        let name = step.name();
        let policy = step.retry_policy();
        let mut attempt = 1;

        loop {
            let error = match guarded_forward(step, ctx).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if error.is_retryable() && policy.allows_retry(attempt) {
                let backoff = policy.backoff_for(attempt);
                if backoff >= ctx.remaining() {
                    tracing::warn!(step = name, attempt, %error, "no time left to retry before deadline");
                    run.record(SagaEvent::step_failed(
                        name,
                        ErrorKind::Timeout,
                        error.message(),
                        attempt,
                    ));
                    return Err(StepFailure {
                        kind: ErrorKind::Timeout,
                        reason: FailureReason::DeadlineExceeded {
                            pending_step: Some(name.to_string()),
                        },
                    });
                }

                tracing::warn!(step = name, attempt, ?backoff, %error, "retrying saga step");
                metrics::counter!("saga_step_retries_total").increment(1);
                let backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
                run.record(SagaEvent::step_retried(name, attempt, error.message(), backoff_ms));
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            let kind = error.kind();
            tracing::warn!(step = name, attempt, %error, "saga step failed");
            run.record(SagaEvent::step_failed(name, kind, error.message(), attempt));

            let reason = match error {
                StepError::Validation(message) => FailureReason::Validation {
                    step: name.to_string(),
                    message,
                },
                StepError::ResourceUnavailable(message) | StepError::Transient(message) => {
                    FailureReason::ResourceUnavailable {
                        step: name.to_string(),
                        message,
                        attempts: attempt,
                    }
                }
            };
            return Err(StepFailure { kind, reason });
        }
    }

    /// Compensates completed steps in reverse completion order.
    ///
    /// Every completed step gets exactly one attempt, whatever happened to
    /// the ones before it.
    #[tracing::instrument(skip_all, fields(from_step = ?from_step))]
    async fn compensate<T>(
        &self,
        definition: &SagaDefinition<T>,
        ctx: &ExecutionContext<T>,
        run: &mut SagaRun,
        from_step: Option<String>,
    ) where
        T: Send + Sync,
    {
        run.record(SagaEvent::compensation_started(from_step));

        let completed: Vec<String> = run.completed_steps().to_vec();
        for name in completed.iter().rev() {
            let Some(step) = definition.steps().iter().find(|s| s.name() == name.as_str()) else {
                continue;
            };

            match guarded_compensate(step.as_ref(), ctx).await {
                Ok(()) => {
                    tracing::info!(step = %name, "compensation step completed");
                    run.record(SagaEvent::compensation_step_completed(name));
                }
                Err(message) => {
                    tracing::warn!(step = %name, error = %message, "compensation step failed");
                    metrics::counter!("saga_compensation_failures_total").increment(1);
                    run.record(SagaEvent::compensation_step_failed(name, message));
                }
            }
        }
    }
}

impl std::fmt::Debug for SagaExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Evaluates `should_run`, turning a panic into a resource failure.
fn guarded_should_run<T>(step: &dyn Step<T>, ctx: &ExecutionContext<T>) -> std::result::Result<bool, StepError>
where
    T: Send + Sync,
{
    std::panic::catch_unwind(AssertUnwindSafe(|| step.should_run(ctx))).map_err(|panic| {
        StepError::resource_unavailable(format!(
            "step condition panicked: {}",
            panic_message(panic.as_ref())
        ))
    })
}

/// Calls `forward`, turning a panic into a resource failure.
async fn guarded_forward<T>(
    step: &dyn Step<T>,
    ctx: &ExecutionContext<T>,
) -> std::result::Result<serde_json::Value, StepError>
where
    T: Send + Sync,
{
    match AssertUnwindSafe(step.forward(ctx)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(StepError::resource_unavailable(format!(
            "step panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

/// Calls `compensate`, turning an error or a panic into a message.
async fn guarded_compensate<T>(step: &dyn Step<T>, ctx: &ExecutionContext<T>) -> std::result::Result<(), String>
where
    T: Send + Sync,
{
    match AssertUnwindSafe(step.compensate(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(error.to_string()),
        Err(panic) => Err(format!(
            "compensation panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn record_metrics(outcome: &Outcome) {
    let duration = outcome.duration.as_secs_f64();
    metrics::histogram!("saga_duration_seconds").record(duration);

    match outcome.status {
        OutcomeStatus::Completed => {
            metrics::counter!("saga_completed").increment(1);
            tracing::info!(duration, "saga completed successfully");
        }
        OutcomeStatus::Aborted => {
            metrics::counter!("saga_aborted").increment(1);
            tracing::warn!(duration, reason = ?outcome.failure_reason, "saga aborted");
        }
        OutcomeStatus::Failed => {
            metrics::counter!("saga_failed").increment(1);
            tracing::warn!(duration, reason = ?outcome.failure_reason, "saga failed");
        }
        OutcomeStatus::TimedOut => {
            metrics::counter!("saga_timed_out").increment(1);
            tracing::warn!(duration, reason = ?outcome.failure_reason, "saga timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        result: std::result::Result<serde_json::Value, StepError>,
    }

    #[async_trait]
    impl Step<()> for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn forward(
            &self,
            _ctx: &ExecutionContext<()>,
        ) -> std::result::Result<serde_json::Value, StepError> {
            self.result.clone()
        }
    }

    struct Panicking;

    #[async_trait]
    impl Step<()> for Panicking {
        fn name(&self) -> &str {
            "explode"
        }

        async fn forward(
            &self,
            _ctx: &ExecutionContext<()>,
        ) -> std::result::Result<serde_json::Value, StepError> {
            panic!("boom");
        }
    }

    fn ctx() -> ExecutionContext<()> {
        ExecutionContext::with_timeout(EntityId::new(), (), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_results_are_returned_in_outcome() {
        let executor = SagaExecutor::in_memory(ExecutorConfig::default());
        let definition = SagaDefinition::builder("single")
            .step(Fixed {
                name: "only",
                result: Ok(json!({"id": 7})),
            })
            .build()
            .unwrap();

        let outcome = executor.run(&definition, ctx()).await;

        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert_eq!(outcome.saga, "single");
        assert_eq!(outcome.result("only"), Some(&json!({"id": 7})));
    }

    #[tokio::test]
    async fn test_forward_panic_becomes_resource_failure() {
        let executor = SagaExecutor::in_memory(ExecutorConfig::default());
        let definition = SagaDefinition::builder("panicky")
            .step(Fixed {
                name: "first",
                result: Ok(json!(null)),
            })
            .step(Panicking)
            .build()
            .unwrap();

        let outcome = executor.run(&definition, ctx()).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.compensated_steps, vec!["first".to_string()]);
        match outcome.failure_reason {
            Some(FailureReason::ResourceUnavailable { step, message, .. }) => {
                assert_eq!(step, "explode");
                assert_eq!(message, "step panicked: boom");
            }
            other => panic!("unexpected failure reason: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_step_resource_failure_has_nothing_to_compensate() {
        let executor = SagaExecutor::in_memory(ExecutorConfig::default());
        let definition = SagaDefinition::builder("single")
            .step(Fixed {
                name: "reserve",
                result: Err(StepError::resource_unavailable("Insufficient stock")),
            })
            .build()
            .unwrap();

        let outcome = executor.run(&definition, ctx()).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(outcome.completed_steps.is_empty());
        assert!(outcome.compensated_steps.is_empty());
        assert!(
            !outcome
                .events
                .iter()
                .any(|e| matches!(e, SagaEvent::CompensationStarted(_)))
        );
    }

    #[tokio::test]
    async fn test_context_uses_configured_default_timeout() {
        let executor = SagaExecutor::in_memory(
            ExecutorConfig::default().with_default_timeout(Duration::from_secs(90)),
        );
        let ctx = executor.context(EntityId::new(), ());
        assert!(ctx.remaining() > Duration::from_secs(80));
    }

    #[test]
    fn test_panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
