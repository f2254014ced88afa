use std::time::Duration;

use async_trait::async_trait;
use common::EntityId;
use criterion::{Criterion, criterion_group, criterion_main};
use saga::{
    ExecutionContext, ExecutorConfig, SagaDefinition, SagaEvent, SagaExecutor, SagaRun, Step,
    StepError,
};
use serde_json::json;

struct Noop(&'static str);

#[async_trait]
impl Step<()> for Noop {
    fn name(&self) -> &str {
        self.0
    }

    async fn forward(&self, _ctx: &ExecutionContext<()>) -> Result<serde_json::Value, StepError> {
        Ok(json!({ "step": self.0 }))
    }
}

struct Declined;

#[async_trait]
impl Step<()> for Declined {
    fn name(&self) -> &str {
        "charge"
    }

    async fn forward(&self, _ctx: &ExecutionContext<()>) -> Result<serde_json::Value, StepError> {
        Err(StepError::resource_unavailable("Payment declined"))
    }
}

fn ctx() -> ExecutionContext<()> {
    ExecutionContext::with_timeout(EntityId::new(), (), Duration::from_secs(30))
}

fn bench_happy_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let executor = SagaExecutor::in_memory(ExecutorConfig::default());
    let definition = SagaDefinition::builder("bench")
        .step(Noop("validate"))
        .step(Noop("reserve"))
        .step(Noop("charge"))
        .step(Noop("confirm"))
        .step(Noop("follow_up"))
        .build()
        .unwrap();

    c.bench_function("saga/five_steps_completed", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outcome = executor.run(&definition, ctx()).await;
                assert!(outcome.is_success());
            });
        });
    });
}

fn bench_compensation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let executor = SagaExecutor::in_memory(ExecutorConfig::default());
    let definition = SagaDefinition::builder("bench")
        .step(Noop("validate"))
        .step(Noop("reserve"))
        .step(Declined)
        .build()
        .unwrap();

    c.bench_function("saga/failure_with_compensation", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outcome = executor.run(&definition, ctx()).await;
                assert_eq!(outcome.compensated_steps.len(), 2);
            });
        });
    });
}

fn bench_journal_replay(c: &mut Criterion) {
    let mut events = vec![SagaEvent::saga_started("bench", EntityId::new())];
    for i in 0..50 {
        let name = format!("step-{i}");
        events.push(SagaEvent::step_started(name.as_str()));
        events.push(SagaEvent::step_completed(name.as_str(), json!(i)));
    }
    events.push(SagaEvent::saga_completed());

    c.bench_function("saga/replay_102_events", |b| {
        b.iter(|| SagaRun::from_events(events.clone()));
    });
}

criterion_group!(
    benches,
    bench_happy_path,
    bench_compensation,
    bench_journal_replay
);
criterion_main!(benches);
