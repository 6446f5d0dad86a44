//! Workflow definition types
//!
//! These types are deserialized from YAML definition files and validated
//! before the mediator accepts them. A definition is immutable after load;
//! execution order is derived from `depends_on`, never from list order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ensemble_domain::TopicKind;

// =============================================================================
// Root Definition
// =============================================================================

/// Root workflow definition parsed from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowDefinition {
    /// Human-readable workflow name, unique across loaded definitions
    pub name: String,

    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Semantic version of the definition (`X.Y.Z`)
    pub version: String,

    /// The external event whose arrival creates a new run
    pub initiating_event: InitiatingEvent,

    /// Step definitions; at least two are required
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// Look up a step by name
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Find the step awaiting a reply on `topic` for the given outcome kind.
    ///
    /// Returns `None` for `TopicKind::Execute` (execute topics are outbound
    /// only) and for topics no step declares.
    #[must_use]
    pub fn step_awaiting(&self, kind: TopicKind, topic: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| {
            let set = match kind {
                TopicKind::Success => &step.response_topic.success,
                TopicKind::Failure => &step.response_topic.failure,
                TopicKind::Execute => return false,
            };
            set.iter().any(|t| t == topic)
        })
    }

    /// Every topic this definition references: the initiating topic, each
    /// step's execute topic, and both response sets.
    #[must_use]
    pub fn referenced_topics(&self) -> BTreeSet<String> {
        let mut topics = BTreeSet::new();
        topics.insert(self.initiating_event.topic.clone());
        for step in &self.steps {
            topics.insert(step.topic.clone());
            topics.extend(step.response_topic.success.iter().cloned());
            topics.extend(step.response_topic.failure.iter().cloned());
        }
        topics
    }
}

// =============================================================================
// Initiating Event
// =============================================================================

/// The externally-owned event that starts a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InitiatingEvent {
    /// Pseudo-step key the initiating payload is recorded under
    pub name: String,

    /// Topic the initiating message arrives on. Externally owned, so it is
    /// not held to the execute/success/failure discipline.
    pub topic: String,
}

// =============================================================================
// Step Definition
// =============================================================================

/// A single request/response exchange within a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StepDefinition {
    /// Step name, alphanumeric and unique within the workflow
    pub name: String,

    /// Execute-topic the step publishes its resolved inputs to
    pub topic: String,

    /// Parameter name to `{{Step.field}}` template expression
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, String>,

    /// Steps that must have succeeded before this step is dispatchable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Topics the step's reply may arrive on
    pub response_topic: ResponseTopics,

    /// Actions evaluated in order when the step succeeds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<ActionDescriptor>,

    /// Action evaluated when the step fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<ActionDescriptor>,
}

/// Success and failure reply topics for a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResponseTopics {
    /// Topics carrying a successful reply (`<ns>.success.<action>`)
    pub success: Vec<String>,

    /// Topics carrying a failed reply (`<ns>.failure.<action>`)
    pub failure: Vec<String>,
}

// =============================================================================
// Action Descriptor
// =============================================================================

/// A named action with free-form parameters, e.g.
/// `{action: retry, max_attempts: 3, action_after_attempts: abort}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Registry name of the action
    pub action: String,

    /// Remaining descriptor fields, passed to the handler verbatim
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ActionDescriptor {
    /// Create a descriptor with no parameters
    #[must_use]
    pub fn bare(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Map::new(),
        }
    }

    /// Fetch a parameter by name
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_step(name: &str, ns: &str) -> StepDefinition {
        StepDefinition {
            name: name.to_string(),
            topic: format!("{ns}.execute.run"),
            input: BTreeMap::new(),
            depends_on: vec![],
            response_topic: ResponseTopics {
                success: vec![format!("{ns}.success.run")],
                failure: vec![format!("{ns}.failure.run")],
            },
            on_success: vec![],
            on_failure: None,
        }
    }

    fn sample_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "sample".to_string(),
            description: None,
            version: "1.0.0".to_string(),
            initiating_event: InitiatingEvent {
                name: "Start".to_string(),
                topic: "external.events".to_string(),
            },
            steps: vec![sample_step("First", "a"), sample_step("Second", "b")],
        }
    }

    #[test]
    fn test_step_lookup() {
        let definition = sample_definition();
        assert!(definition.step("First").is_some());
        assert!(definition.step("Missing").is_none());
    }

    #[test]
    fn test_step_awaiting() {
        let definition = sample_definition();

        let step = definition
            .step_awaiting(TopicKind::Success, "b.success.run")
            .unwrap();
        assert_eq!(step.name, "Second");

        let step = definition
            .step_awaiting(TopicKind::Failure, "a.failure.run")
            .unwrap();
        assert_eq!(step.name, "First");

        assert!(definition
            .step_awaiting(TopicKind::Execute, "a.execute.run")
            .is_none());
        assert!(definition
            .step_awaiting(TopicKind::Success, "c.success.run")
            .is_none());
    }

    #[test]
    fn test_referenced_topics() {
        let definition = sample_definition();
        let topics = definition.referenced_topics();

        assert!(topics.contains("external.events"));
        assert!(topics.contains("a.execute.run"));
        assert!(topics.contains("a.success.run"));
        assert!(topics.contains("b.failure.run"));
        assert_eq!(topics.len(), 7);
    }

    #[test]
    fn test_action_descriptor_params() {
        let yaml = "action: retry\nmax_attempts: 3\naction_after_attempts: abort\n";
        let descriptor: ActionDescriptor = serde_yml::from_str(yaml).unwrap();

        assert_eq!(descriptor.action, "retry");
        assert_eq!(descriptor.param("max_attempts"), Some(&Value::from(3)));
        assert_eq!(
            descriptor.param("action_after_attempts").and_then(Value::as_str),
            Some("abort")
        );
    }
}
