//! Ordered, reusable list of steps describing one workflow.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, SagaError};
use crate::step::Step;

/// An immutable saga definition.
///
/// Holds no per-run state, so one definition can be shared by any number of
/// concurrent runs. Cloning is cheap.
pub struct SagaDefinition<T>
where
    T: Send + Sync,
{
    name: String,
    steps: Arc<[Arc<dyn Step<T>>]>,
}

impl<T> Clone for SagaDefinition<T>
where
    T: Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            steps: Arc::clone(&self.steps),
        }
    }
}

impl<T> std::fmt::Debug for SagaDefinition<T>
where
    T: Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaDefinition")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

impl<T> SagaDefinition<T>
where
    T: Send + Sync,
{
    /// Starts building a definition with the given name.
    pub fn builder(name: impl Into<String>) -> SagaDefinitionBuilder<T> {
        SagaDefinitionBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in forward-execution order.
    pub fn steps(&self) -> &[Arc<dyn Step<T>>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder for [`SagaDefinition`].
pub struct SagaDefinitionBuilder<T>
where
    T: Send + Sync,
{
    name: String,
    steps: Vec<Arc<dyn Step<T>>>,
}

impl<T> SagaDefinitionBuilder<T>
where
    T: Send + Sync,
{
    /// Appends a step.
    pub fn step<S>(mut self, step: S) -> Self
    where
        S: Step<T> + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    /// Appends an already shared step.
    pub fn shared_step(mut self, step: Arc<dyn Step<T>>) -> Self {
        self.steps.push(step);
        self
    }

    /// Validates step names and freezes the definition.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no steps, a step name is empty, or two
    /// steps share a name.
    pub fn build(self) -> Result<SagaDefinition<T>> {
        if self.steps.is_empty() {
            return Err(SagaError::NoSteps(self.name));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            let step_name = step.name();
            if step_name.is_empty() {
                return Err(SagaError::EmptyStepName { saga: self.name });
            }
            if !seen.insert(step_name.to_string()) {
                return Err(SagaError::DuplicateStep {
                    saga: self.name,
                    step: step_name.to_string(),
                });
            }
        }

        Ok(SagaDefinition {
            name: self.name,
            steps: self.steps.into(),
        })
    }
}
