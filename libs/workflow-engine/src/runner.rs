//! Run engine
//!
//! Drives a single workflow run from its initiating event to a terminal
//! status: creates the run, resolves and dispatches ready steps, interprets
//! replies, evaluates success/failure actions, and persists the run after
//! every transition.
//!
//! All work for one workflow_id is serialized behind a per-run lock, so
//! concurrent deliveries on different topics cannot interleave transitions
//! of the same run.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use thiserror::Error;

use ensemble_bus::{BusError, MessageBus};
use ensemble_domain::{topic, EventPayload, RunStatus, StepStatus, TopicKind};
use ensemble_store::{StateStore, StoreError};

use crate::actions::{ActionContext, ActionError, ActionRegistry};
use crate::definition::{ActionDescriptor, StepDefinition, WorkflowDefinition};
use crate::state::{RunState, StateTransitionError};
use crate::template::{self, TemplateError};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by the run engine.
///
/// Store and bus failures are retryable at the delivery layer; the consumer
/// logs them and relies on at-least-once redelivery. Template failures are
/// recorded in the run state instead of propagating.
#[derive(Debug, Error)]
pub enum EngineError {
    /// State store I/O failed
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// Publishing to the bus failed
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// A step's inputs could not be resolved
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// Run state could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A mutation would have broken step-status monotonicity
    #[error("state transition error: {0}")]
    State(#[from] StateTransitionError),

    /// An action handler failed
    #[error("action error: {0}")]
    Action(ActionError),
}

// =============================================================================
// Run Engine
// =============================================================================

/// Per-run state machine over a bus and a state store
pub struct RunEngine {
    store: Arc<dyn StateStore>,
    bus: Arc<dyn MessageBus>,
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
    success_actions: ActionRegistry,
    failure_actions: ActionRegistry,
    run_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RunEngine {
    /// Create an engine with the built-in action registries
    #[must_use]
    pub fn new(
        store: Arc<dyn StateStore>,
        bus: Arc<dyn MessageBus>,
        definitions: impl IntoIterator<Item = Arc<WorkflowDefinition>>,
    ) -> Self {
        Self::with_registries(
            store,
            bus,
            definitions,
            ActionRegistry::with_success_builtins(),
            ActionRegistry::with_failure_builtins(),
        )
    }

    /// Create an engine with caller-extended action registries
    #[must_use]
    pub fn with_registries(
        store: Arc<dyn StateStore>,
        bus: Arc<dyn MessageBus>,
        definitions: impl IntoIterator<Item = Arc<WorkflowDefinition>>,
        success_actions: ActionRegistry,
        failure_actions: ActionRegistry,
    ) -> Self {
        Self {
            store,
            bus,
            definitions: definitions
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            success_actions,
            failure_actions,
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The per-run mutual-exclusion primitive for `workflow_id`
    fn lock_for(&self, workflow_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.run_locks.lock().expect("run lock map poisoned");
        Arc::clone(locks.entry(workflow_id.to_string()).or_default())
    }

    /// Load a run by id, for introspection and tests
    pub async fn load_run(&self, workflow_id: &str) -> Result<Option<RunState>, EngineError> {
        match self.store.get(workflow_id).await? {
            Some(raw) => Ok(Some(RunState::from_json(&raw)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Init
    // =========================================================================

    /// Create a run from an initiating message.
    ///
    /// The raw payload must be a JSON object; anything else is logged and
    /// dropped. Returns the new workflow_id, or `None` when dropped.
    pub async fn init_run(
        &self,
        definition: &WorkflowDefinition,
        raw: &[u8],
    ) -> Result<Option<String>, EngineError> {
        let output = match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(output)) => output,
            Ok(other) => {
                tracing::warn!(
                    workflow = %definition.name,
                    payload_type = %json_type_name(&other),
                    "initiating message is not a JSON object; dropped"
                );
                return Ok(None);
            }
            Err(err) => {
                tracing::warn!(
                    workflow = %definition.name,
                    error = %err,
                    "initiating message is not valid JSON; dropped"
                );
                return Ok(None);
            }
        };

        let workflow_id = self.store.new_key();
        let payload = EventPayload::synthesize(workflow_id.clone(), output);
        let mut run = RunState::new(
            workflow_id.clone(),
            definition.name.clone(),
            &definition.initiating_event.name,
            payload,
        );

        let lock = self.lock_for(&workflow_id);
        let _guard = lock.lock().await;

        if let Err(err) = self.advance(definition, &mut run).await {
            match err {
                EngineError::Template(template_err) => tracing::error!(
                    %workflow_id,
                    workflow = %definition.name,
                    error = %template_err,
                    "input resolution failed at init; run failed"
                ),
                other => return Err(other),
            }
        }
        self.persist(&run).await?;

        tracing::info!(
            %workflow_id,
            workflow = %definition.name,
            status = ?run.status,
            "run initiated"
        );
        Ok(Some(workflow_id))
    }

    // =========================================================================
    // Continue
    // =========================================================================

    /// React to a reply delivered on a response topic.
    ///
    /// Unknown topics, unknown runs, and replies for steps that are no
    /// longer ongoing are logged and dropped; they are delivery anomalies,
    /// never fatal.
    pub async fn continue_run(
        &self,
        reply_topic: &str,
        payload: EventPayload,
    ) -> Result<(), EngineError> {
        let kind = match topic::classify(reply_topic) {
            Some(TopicKind::Execute) => {
                tracing::debug!(topic = %reply_topic, "execute topics are outbound only; ignored");
                return Ok(());
            }
            Some(kind) => kind,
            None => {
                tracing::warn!(topic = %reply_topic, "message on undisciplined topic; dropped");
                return Ok(());
            }
        };
        let outcome = if kind == TopicKind::Success {
            StepStatus::Success
        } else {
            StepStatus::Failure
        };

        let workflow_id = payload.workflow_id.clone();
        let lock = self.lock_for(&workflow_id);
        let _guard = lock.lock().await;

        let Some(raw) = self.store.get(&workflow_id).await? else {
            tracing::info!(
                %workflow_id,
                topic = %reply_topic,
                "reply for a run this mediator does not own; dropped"
            );
            return Ok(());
        };
        let mut run = RunState::from_json(&raw)?;

        let Some(definition) = self.definitions.get(&run.name).map(Arc::clone) else {
            tracing::warn!(
                %workflow_id,
                workflow = %run.name,
                "run references an unloaded workflow definition; dropped"
            );
            return Ok(());
        };

        let Some(step) = definition.step_awaiting(kind, reply_topic) else {
            tracing::info!(
                %workflow_id,
                topic = %reply_topic,
                "no step awaits this topic; dropped"
            );
            return Ok(());
        };

        // Idempotency gate: duplicates and late replies for settled steps
        if run.step_status(&step.name) != Some(StepStatus::Ongoing) {
            tracing::info!(
                %workflow_id,
                step = %step.name,
                status = ?run.step_status(&step.name),
                "reply for a step that is not ongoing; dropped"
            );
            return Ok(());
        }

        run.record_response(&step.name, outcome, payload)?;
        run.detect_status(&definition);

        if run.status == RunStatus::InProgress {
            if let Err(err) = self.advance(&definition, &mut run).await {
                match err {
                    EngineError::Template(template_err) => tracing::error!(
                        %workflow_id,
                        error = %template_err,
                        "input resolution failed; run failed"
                    ),
                    other => return Err(other),
                }
            }
        }

        self.evaluate_actions(&definition, &mut run, step, outcome)
            .await?;
        run.detect_status(&definition);

        self.persist(&run).await?;
        tracing::info!(
            %workflow_id,
            step = %step.name,
            outcome = ?outcome,
            status = ?run.status,
            "reply processed"
        );
        Ok(())
    }

    /// Run the step's handlers for the observed outcome
    async fn evaluate_actions(
        &self,
        definition: &WorkflowDefinition,
        run: &mut RunState,
        step: &StepDefinition,
        outcome: StepStatus,
    ) -> Result<(), EngineError> {
        let (descriptors, registry): (Vec<&ActionDescriptor>, &ActionRegistry) = match outcome {
            StepStatus::Success => (step.on_success.iter().collect(), &self.success_actions),
            StepStatus::Failure => (step.on_failure.iter().collect(), &self.failure_actions),
            StepStatus::Ongoing => return Ok(()),
        };

        let mut ctx = ActionContext::new(
            definition,
            run,
            &step.name,
            registry,
            self.bus.as_ref(),
            self.store.as_ref(),
        );
        for descriptor in descriptors {
            if let Err(err) = ctx.run_handler(&descriptor.action, &descriptor.params).await {
                if let ActionError::Template(template_err) = err {
                    tracing::error!(
                        workflow_id = %ctx.run.workflow_id,
                        step = %ctx.step_name,
                        error = %template_err,
                        "re-dispatch failed to resolve inputs; run failed"
                    );
                    ctx.run.status = RunStatus::Failed;
                    break;
                }
                return Err(EngineError::Action(err));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Advance
    // =========================================================================

    /// Dispatch every step whose dependencies are all satisfied.
    ///
    /// A step that fails input resolution is never dispatched; the run is
    /// marked failed and the error returned, after the remaining ready steps
    /// have been considered.
    async fn advance(
        &self,
        definition: &WorkflowDefinition,
        run: &mut RunState,
    ) -> Result<(), EngineError> {
        let done: HashSet<&str> = run
            .steps
            .values()
            .filter(|s| s.status == StepStatus::Success)
            .map(|s| s.name.as_str())
            .collect();

        let ready: Vec<&StepDefinition> = definition
            .steps
            .iter()
            .filter(|step| !run.steps.contains_key(&step.name))
            .filter(|step| step.depends_on.iter().all(|d| done.contains(d.as_str())))
            .collect();

        let mut unresolved = None;
        for step in ready {
            match template::resolve_inputs(&step.input, &run.steps) {
                Ok(inputs) => {
                    self.dispatch(run, step, &inputs).await?;
                }
                Err(err) => {
                    tracing::error!(
                        workflow_id = %run.workflow_id,
                        step = %step.name,
                        error = %err,
                        "step inputs did not resolve; dispatch aborted"
                    );
                    unresolved = Some(err);
                }
            }
        }

        if let Some(err) = unresolved {
            run.status = RunStatus::Failed;
            return Err(EngineError::Template(err));
        }
        Ok(())
    }

    /// Publish the execute message for one step and mark it ongoing.
    ///
    /// The body is exactly the resolved input mapping; the workflow_id is
    /// not embedded. Downstream services echo it back in their reply
    /// envelope.
    async fn dispatch(
        &self,
        run: &mut RunState,
        step: &StepDefinition,
        inputs: &Map<String, Value>,
    ) -> Result<(), EngineError> {
        self.bus
            .publish(&step.topic, serde_json::to_vec(inputs)?)
            .await?;
        run.mark_ongoing(&step.name)?;
        tracing::debug!(
            workflow_id = %run.workflow_id,
            step = %step.name,
            topic = %step.topic,
            "step dispatched"
        );
        Ok(())
    }

    async fn persist(&self, run: &RunState) -> Result<(), EngineError> {
        self.store.set(&run.workflow_id, &run.to_json()?).await?;
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
