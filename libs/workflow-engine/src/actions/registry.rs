//! Action trait, context, and registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use ensemble_bus::{BusError, MessageBus};
use ensemble_domain::RunStatus;
use ensemble_store::{StateStore, StoreError};

use crate::definition::WorkflowDefinition;
use crate::state::{RunState, StateTransitionError, StepState};
use crate::template::{self, TemplateError};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while running an action handler
#[derive(Debug, Error)]
pub enum ActionError {
    /// Re-resolving a step's inputs failed
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// The state store failed
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// The bus failed
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// A mutation would have broken step-status monotonicity
    #[error("state transition error: {0}")]
    State(#[from] StateTransitionError),

    /// Run state could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Action Trait
// =============================================================================

/// A named success or failure action
#[async_trait]
pub trait Action: Send + Sync {
    /// Registry name of the action
    fn name(&self) -> &str;

    /// Execute the action against the current run
    async fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        params: &Map<String, Value>,
    ) -> Result<(), ActionError>;
}

// =============================================================================
// Action Context
// =============================================================================

/// Capability set handed to an action handler for its duration.
///
/// Handlers may mutate the run state directly (skip rewrites the run
/// status), reset and re-dispatch their step via [`retry_step`], or chain
/// into another handler of the same registry via [`run_handler`].
///
/// [`retry_step`]: ActionContext::retry_step
/// [`run_handler`]: ActionContext::run_handler
pub struct ActionContext<'a> {
    /// Definition of the workflow this run executes
    pub definition: &'a WorkflowDefinition,

    /// Mutable run state; the engine persists it after all handlers finish
    pub run: &'a mut RunState,

    /// Name of the step whose reply triggered the handlers
    pub step_name: &'a str,

    registry: &'a ActionRegistry,
    bus: &'a dyn MessageBus,
    store: &'a dyn StateStore,
}

impl<'a> ActionContext<'a> {
    /// Assemble a context for one handler evaluation pass
    #[must_use]
    pub fn new(
        definition: &'a WorkflowDefinition,
        run: &'a mut RunState,
        step_name: &'a str,
        registry: &'a ActionRegistry,
        bus: &'a dyn MessageBus,
        store: &'a dyn StateStore,
    ) -> Self {
        Self {
            definition,
            run,
            step_name,
            registry,
            bus,
            store,
        }
    }

    /// State of the step the handlers run for
    #[must_use]
    pub fn step_state(&self) -> Option<&StepState> {
        self.run.step(self.step_name)
    }

    /// The state store, for handler-owned keys such as retry counters
    #[must_use]
    pub fn store(&self) -> &dyn StateStore {
        self.store
    }

    /// Reset the current step to ongoing, persist the run, and re-publish
    /// its execute message with freshly re-resolved inputs.
    pub async fn retry_step(&mut self) -> Result<(), ActionError> {
        let Some(step) = self.definition.step(self.step_name) else {
            tracing::warn!(
                workflow_id = %self.run.workflow_id,
                step = %self.step_name,
                "retry requested for a step the definition does not declare"
            );
            return Ok(());
        };

        let inputs = template::resolve_inputs(&step.input, &self.run.steps)?;
        let topic = step.topic.clone();

        self.run.mark_ongoing(self.step_name)?;
        self.run.status = RunStatus::InProgress;
        self.store
            .set(&self.run.workflow_id, &self.run.to_json()?)
            .await?;
        self.bus.publish(&topic, serde_json::to_vec(&inputs)?).await?;

        tracing::info!(
            workflow_id = %self.run.workflow_id,
            step = %self.step_name,
            %topic,
            "step re-dispatched"
        );
        Ok(())
    }

    /// Run another handler from the same registry.
    ///
    /// An unregistered name is a warning and a no-op, never an error.
    pub async fn run_handler(
        &mut self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<(), ActionError> {
        let Some(handler) = self.registry.get(name) else {
            tracing::warn!(
                workflow_id = %self.run.workflow_id,
                step = %self.step_name,
                action = name,
                "no handler registered for action; ignoring"
            );
            return Ok(());
        };
        handler.execute(self, params).await
    }
}

// =============================================================================
// Action Registry
// =============================================================================

/// Registry of available actions for one outcome kind
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry preloaded with the success built-ins (`log`, `log_output`)
    #[must_use]
    pub fn with_success_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::builtin::LogAction));
        registry.register(Arc::new(super::builtin::LogOutputAction));
        registry
    }

    /// Registry preloaded with the failure built-ins (`retry`, `skip`, `abort`)
    #[must_use]
    pub fn with_failure_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::builtin::RetryAction));
        registry.register(Arc::new(super::builtin::SkipAction));
        registry.register(Arc::new(super::builtin::AbortAction));
        registry
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(&mut self, handler: Arc<dyn Action>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Get a handler by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.handlers.get(name).cloned()
    }

    /// List registered handler names
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registries() {
        let success = ActionRegistry::with_success_builtins();
        assert!(success.get("log").is_some());
        assert!(success.get("log_output").is_some());
        assert!(success.get("retry").is_none());

        let failure = ActionRegistry::with_failure_builtins();
        assert!(failure.get("retry").is_some());
        assert!(failure.get("skip").is_some());
        assert!(failure.get("abort").is_some());
        assert!(failure.get("log").is_none());
    }

    #[test]
    fn test_register_replaces() {
        struct Custom;

        #[async_trait]
        impl Action for Custom {
            fn name(&self) -> &str {
                "log"
            }

            async fn execute(
                &self,
                _ctx: &mut ActionContext<'_>,
                _params: &Map<String, Value>,
            ) -> Result<(), ActionError> {
                Ok(())
            }
        }

        let mut registry = ActionRegistry::with_success_builtins();
        registry.register(Arc::new(Custom));
        assert_eq!(registry.list().len(), 2);
    }
}
