//! Run state persisted under the run's workflow_id key

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ensemble_domain::{EventPayload, RunStatus, StepStatus};

use super::step_state::{StateTransitionError, StepState};
use crate::definition::WorkflowDefinition;

// =============================================================================
// Run State
// =============================================================================

/// Aggregate state of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Opaque run identifier issued by the state store
    pub workflow_id: String,

    /// Name of the workflow definition this run executes
    pub name: String,

    /// When the initiating event was accepted
    pub initiated_at: DateTime<Utc>,

    /// Current run status
    pub status: RunStatus,

    /// Step name to step state, including the initiating pseudo-step
    pub steps: HashMap<String, StepState>,
}

impl RunState {
    /// Create the state for a freshly initiated run.
    ///
    /// The initiating pseudo-step is recorded as already succeeded, carrying
    /// the synthesized envelope, so templates can reference it like any other
    /// completed step.
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        initiating_step: &str,
        initiating_payload: EventPayload,
    ) -> Self {
        let mut steps = HashMap::new();
        steps.insert(
            initiating_step.to_string(),
            StepState::completed(initiating_step, StepStatus::Success, initiating_payload),
        );

        Self {
            workflow_id: workflow_id.into(),
            name: workflow_name.into(),
            initiated_at: Utc::now(),
            status: RunStatus::InProgress,
            steps,
        }
    }

    /// Get the state of a step, if it has one yet
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepState> {
        self.steps.get(name)
    }

    /// Get a step's status, if it has one yet
    #[must_use]
    pub fn step_status(&self, name: &str) -> Option<StepStatus> {
        self.steps.get(name).map(|s| s.status)
    }

    /// Mark a step as dispatched and awaiting its reply.
    ///
    /// Legal for a step with no state yet (first dispatch) and for a failed
    /// step being reset by a retry; any other edge is rejected.
    pub fn mark_ongoing(&mut self, name: &str) -> Result<(), StateTransitionError> {
        if let Some(existing) = self.steps.get(name) {
            if !existing.can_transition_to(StepStatus::Ongoing) {
                return Err(StateTransitionError::InvalidTransition {
                    from: existing.status.as_str(),
                    to: StepStatus::Ongoing.as_str(),
                });
            }
        }
        self.steps
            .insert(name.to_string(), StepState::ongoing(name));
        Ok(())
    }

    /// Record a reply for a step.
    ///
    /// The step must be ongoing; replies for untracked or settled steps are
    /// rejected so status edges stay monotone.
    pub fn record_response(
        &mut self,
        name: &str,
        status: StepStatus,
        payload: EventPayload,
    ) -> Result<(), StateTransitionError> {
        let existing = self
            .steps
            .get(name)
            .ok_or_else(|| StateTransitionError::StepNotFound(name.to_string()))?;
        if !existing.can_transition_to(status) {
            return Err(StateTransitionError::InvalidTransition {
                from: existing.status.as_str(),
                to: status.as_str(),
            });
        }
        self.steps
            .insert(name.to_string(), StepState::completed(name, status, payload));
        Ok(())
    }

    /// Detect a terminal condition from the current step statuses.
    ///
    /// A run already in a terminal status is left alone; recovery actions
    /// (retry, skip) rewrite the status themselves. Otherwise: every declared
    /// step succeeded means `Success`, any failed step means `Failed`, and
    /// anything else leaves the status as is.
    pub fn detect_status(&mut self, definition: &WorkflowDefinition) {
        if self.status.is_terminal() {
            return;
        }

        let all_succeeded = definition
            .steps
            .iter()
            .all(|step| self.step_status(&step.name) == Some(StepStatus::Success));

        if all_succeeded {
            self.status = RunStatus::Success;
        } else if self
            .steps
            .values()
            .any(|step| step.status == StepStatus::Failure)
        {
            self.status = RunStatus::Failed;
        }
    }

    /// Serialize for the state store
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from the state store
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{InitiatingEvent, ResponseTopics, StepDefinition};
    use serde_json::Map;

    fn definition_with_steps(names: &[&str]) -> WorkflowDefinition {
        WorkflowDefinition {
            name: "wf".to_string(),
            description: None,
            version: "1.0.0".to_string(),
            initiating_event: InitiatingEvent {
                name: "Start".to_string(),
                topic: "external.start".to_string(),
            },
            steps: names
                .iter()
                .map(|name| StepDefinition {
                    name: (*name).to_string(),
                    topic: format!("{name}.execute.run"),
                    input: std::collections::BTreeMap::new(),
                    depends_on: vec![],
                    response_topic: ResponseTopics {
                        success: vec![format!("{name}.success.run")],
                        failure: vec![format!("{name}.failure.run")],
                    },
                    on_success: vec![],
                    on_failure: None,
                })
                .collect(),
        }
    }

    fn new_run() -> RunState {
        RunState::new(
            "wf-1",
            "wf",
            "Start",
            EventPayload::synthesize("wf-1", Map::new()),
        )
    }

    #[test]
    fn test_initiating_pseudo_step() {
        let run = new_run();

        assert_eq!(run.status, RunStatus::InProgress);
        assert_eq!(run.step_status("Start"), Some(StepStatus::Success));
        assert!(run.step("Start").unwrap().payload.is_some());
    }

    fn respond(run: &mut RunState, step: &str, status: StepStatus) {
        run.record_response(step, status, EventPayload::synthesize("wf-1", Map::new()))
            .unwrap();
    }

    #[test]
    fn test_detect_success_requires_every_declared_step() {
        let definition = definition_with_steps(&["A", "B"]);
        let mut run = new_run();
        run.mark_ongoing("A").unwrap();
        run.mark_ongoing("B").unwrap();

        respond(&mut run, "A", StepStatus::Success);
        run.detect_status(&definition);
        assert_eq!(run.status, RunStatus::InProgress);

        respond(&mut run, "B", StepStatus::Success);
        run.detect_status(&definition);
        assert_eq!(run.status, RunStatus::Success);
    }

    #[test]
    fn test_detect_failure() {
        let definition = definition_with_steps(&["A", "B"]);
        let mut run = new_run();
        run.mark_ongoing("A").unwrap();

        respond(&mut run, "A", StepStatus::Failure);
        run.detect_status(&definition);
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_terminal_status_is_left_alone() {
        let definition = definition_with_steps(&["A", "B"]);
        let mut run = new_run();
        run.mark_ongoing("A").unwrap();
        run.mark_ongoing("B").unwrap();

        // Failure on A, then a skip-style rescue
        respond(&mut run, "A", StepStatus::Failure);
        run.detect_status(&definition);
        run.status = RunStatus::Success;

        // A later reply must not drag the run back to Failed
        respond(&mut run, "B", StepStatus::Success);
        run.detect_status(&definition);
        assert_eq!(run.status, RunStatus::Success);
    }

    #[test]
    fn test_retry_reset_reopens_detection() {
        let definition = definition_with_steps(&["A", "B"]);
        let mut run = new_run();
        run.mark_ongoing("A").unwrap();

        respond(&mut run, "A", StepStatus::Failure);
        run.detect_status(&definition);
        assert_eq!(run.status, RunStatus::Failed);

        // Retry resets the step and reopens the run
        run.mark_ongoing("A").unwrap();
        run.status = RunStatus::InProgress;
        run.detect_status(&definition);
        assert_eq!(run.status, RunStatus::InProgress);
    }

    #[test]
    fn test_illegal_edges_are_rejected() {
        let mut run = new_run();

        // A reply for a step that was never dispatched
        let result =
            run.record_response("A", StepStatus::Success, EventPayload::synthesize("wf-1", Map::new()));
        assert!(matches!(
            result,
            Err(super::StateTransitionError::StepNotFound(_))
        ));

        // A settled step cannot settle again
        run.mark_ongoing("A").unwrap();
        respond(&mut run, "A", StepStatus::Success);
        let result =
            run.record_response("A", StepStatus::Failure, EventPayload::synthesize("wf-1", Map::new()));
        assert!(matches!(
            result,
            Err(super::StateTransitionError::InvalidTransition { .. })
        ));

        // A successful step cannot be reset to ongoing
        assert!(run.mark_ongoing("A").is_err());
        assert_eq!(run.step_status("A"), Some(StepStatus::Success));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut run = new_run();
        run.mark_ongoing("A").unwrap();

        let restored = RunState::from_json(&run.to_json().unwrap()).unwrap();
        assert_eq!(restored, run);
    }
}
