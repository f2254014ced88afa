//! In-memory saga run built by folding journal events.

use std::collections::HashMap;
use std::time::Duration;

use common::EntityId;
use serde::{Deserialize, Serialize};

use crate::events::SagaEvent;
use crate::outcome::{CompensationError, FailureReason, Outcome, OutcomeStatus};
use crate::state::SagaState;

/// The state of one saga run, derived from its events.
///
/// The executor never mutates a run directly: it [`record`](SagaRun::record)s
/// an event, which is appended to the journal and applied. Folding the same
/// journal into a fresh `SagaRun` therefore reproduces the run exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SagaRun {
    saga: String,
    entity_id: Option<EntityId>,
    state: SagaState,
    current_step: usize,
    completed_steps: Vec<String>,
    skipped_steps: Vec<String>,
    compensated_steps: Vec<String>,
    compensation_errors: Vec<CompensationError>,
    results: HashMap<String, serde_json::Value>,
    retries: u32,
    failure_reason: Option<FailureReason>,
    events: Vec<SagaEvent>,
}

impl SagaRun {
    /// Rebuilds a run from a journal.
    pub fn from_events(events: impl IntoIterator<Item = SagaEvent>) -> Self {
        let mut run = SagaRun::default();
        for event in events {
            run.record(event);
        }
        run
    }

    /// Appends an event to the journal and applies it.
    pub fn record(&mut self, event: SagaEvent) {
        self.apply(&event);
        self.events.push(event);
    }

    fn apply(&mut self, event: &SagaEvent) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.saga = data.saga.clone();
                self.entity_id = Some(data.entity_id);
                self.state = SagaState::Running;
            }
            SagaEvent::StepStarted(_) => {
                self.current_step += 1;
            }
            SagaEvent::StepRetried(_) => {
                self.retries += 1;
            }
            SagaEvent::StepCompleted(data) => {
                self.completed_steps.push(data.step_name.clone());
                self.results
                    .insert(data.step_name.clone(), data.result.clone());
            }
            SagaEvent::StepSkipped(data) => {
                self.skipped_steps.push(data.step_name.clone());
            }
            SagaEvent::StepFailed(_) => {
                // The primary reason is carried by the terminal event
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(data) => {
                self.compensated_steps.push(data.step_name.clone());
            }
            SagaEvent::CompensationStepFailed(data) => {
                self.compensated_steps.push(data.step_name.clone());
                self.compensation_errors.push(CompensationError {
                    step: data.step_name.clone(),
                    message: data.error.clone(),
                });
            }
            SagaEvent::SagaCompleted(_) => {
                self.state = SagaState::Completed;
            }
            SagaEvent::SagaAborted(data) => {
                self.state = SagaState::Aborted;
                self.failure_reason = Some(data.reason.clone());
            }
            SagaEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason.clone());
            }
            SagaEvent::SagaTimedOut(data) => {
                self.state = SagaState::TimedOut;
                self.failure_reason = Some(data.reason.clone());
            }
        }
    }

    /// Converts the run into the caller-facing outcome.
    ///
    /// A run that never reached a terminal event reports as `Failed`. `saga`
    /// and `entity_id` fill in for runs rejected before `SagaStarted`.
    pub fn into_outcome(self, saga: &str, entity_id: EntityId, duration: Duration) -> Outcome {
        let status = self.status().unwrap_or(OutcomeStatus::Failed);
        let saga = if self.saga.is_empty() {
            saga.to_string()
        } else {
            self.saga
        };
        Outcome {
            saga,
            entity_id: self.entity_id.unwrap_or(entity_id),
            status,
            completed_steps: self.completed_steps,
            compensated_steps: self.compensated_steps,
            failure_reason: self.failure_reason,
            compensation_errors: self.compensation_errors,
            results: self.results,
            events: self.events,
            duration,
        }
    }
}

// Query methods
impl SagaRun {
    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the terminal status, if the run has finished.
    pub fn status(&self) -> Option<OutcomeStatus> {
        match self.state {
            SagaState::Completed => Some(OutcomeStatus::Completed),
            SagaState::Aborted => Some(OutcomeStatus::Aborted),
            SagaState::Failed => Some(OutcomeStatus::Failed),
            SagaState::TimedOut => Some(OutcomeStatus::TimedOut),
            SagaState::NotStarted | SagaState::Running | SagaState::Compensating => None,
        }
    }

    pub fn saga(&self) -> &str {
        &self.saga
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity_id
    }

    /// Returns the number of steps whose forward action was started.
    pub fn steps_started(&self) -> usize {
        self.current_step
    }

    /// Returns the list of completed step names, in completion order.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn skipped_steps(&self) -> &[String] {
        &self.skipped_steps
    }

    /// Returns the steps whose compensation was attempted, in attempt order.
    pub fn compensated_steps(&self) -> &[String] {
        &self.compensated_steps
    }

    pub fn compensation_errors(&self) -> &[CompensationError] {
        &self.compensation_errors
    }

    pub fn result(&self, step: &str) -> Option<&serde_json::Value> {
        self.results.get(step)
    }

    /// Returns the number of retried forward attempts across all steps.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        self.failure_reason.as_ref()
    }

    pub fn events(&self) -> &[SagaEvent] {
        &self.events
    }
}
