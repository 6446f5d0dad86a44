//! Workflow structural validation
//!
//! Validates definitions for structural correctness:
//! - Topic-name discipline on execute and response topics
//! - Dependency references with typo suggestions
//! - Template input shape
//! - DAG validation (cycle detection)
//!
//! All offenses are collected; a definition with three problems reports all
//! three in one pass.

use std::collections::{HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use petgraph::algo;
use petgraph::graph::DiGraph;
use regex::Regex;

use ensemble_domain::topic;

use crate::actions::{FAILURE_BUILTINS, SUCCESS_BUILTINS};
use crate::definition::WorkflowDefinition;
use crate::template;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version regex is valid"));

static STEP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("step name regex is valid"));

// =============================================================================
// Errors
// =============================================================================

/// A single validation offense with its location in the definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Location in the definition (e.g. "steps[2].topic")
    pub path: String,

    /// What is wrong there
    pub message: String,

    /// Suggested fix (e.g. "Did you mean 'Reserve'?")
    pub suggestion: Option<String>,
}

impl ValidationError {
    /// Create an error at `path`
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion to the error
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

/// Every offense found in one definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Validation Functions
// =============================================================================

/// Validate an entire workflow definition, collecting every offense
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    validate_header(definition, &mut errors);
    validate_steps(definition, &mut errors);
    validate_dependencies(definition, &mut errors);
    validate_dag(definition, &mut errors);
    warn_unknown_actions(definition);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn validate_header(definition: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
    if definition.name.is_empty() {
        errors.push(ValidationError::new("name", "Workflow name must not be empty"));
    }

    if !VERSION_RE.is_match(&definition.version) {
        errors.push(ValidationError::new(
            "version",
            format!("Version '{}' is not of the form X.Y.Z", definition.version),
        ));
    }

    if definition.initiating_event.topic.is_empty() {
        errors.push(ValidationError::new(
            "initiating_event.topic",
            "Initiating topic must not be empty",
        ));
    }
}

fn validate_steps(definition: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
    if definition.steps.len() < 2 {
        errors.push(ValidationError::new(
            "steps",
            "Workflow must define at least two steps",
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for (idx, step) in definition.steps.iter().enumerate() {
        if !STEP_NAME_RE.is_match(&step.name) {
            errors.push(ValidationError::new(
                format!("steps[{idx}].name"),
                format!("Step name '{}' must be alphanumeric", step.name),
            ));
        }

        if !seen.insert(step.name.as_str()) {
            errors.push(ValidationError::new(
                format!("steps[{idx}].name"),
                format!("Duplicate step name '{}'", step.name),
            ));
        }

        if step.name == definition.initiating_event.name {
            errors.push(ValidationError::new(
                format!("steps[{idx}].name"),
                format!(
                    "Step name '{}' collides with the initiating event key",
                    step.name
                ),
            ));
        }

        if !topic::is_execute_topic(&step.topic) {
            errors.push(ValidationError::new(
                format!("steps[{idx}].topic"),
                format!("'{}' is not an execute-topic", step.topic),
            ));
        }

        validate_response_topics(step, idx, errors);
        validate_inputs(step, idx, errors);
    }
}

fn validate_response_topics(
    step: &crate::definition::StepDefinition,
    idx: usize,
    errors: &mut Vec<ValidationError>,
) {
    if step.response_topic.success.is_empty() {
        errors.push(ValidationError::new(
            format!("steps[{idx}].response_topic.success"),
            "At least one success topic is required",
        ));
    }
    for (jdx, t) in step.response_topic.success.iter().enumerate() {
        if !topic::is_success_topic(t) {
            errors.push(ValidationError::new(
                format!("steps[{idx}].response_topic.success[{jdx}]"),
                format!("'{t}' is not a success-topic"),
            ));
        }
    }

    if step.response_topic.failure.is_empty() {
        errors.push(ValidationError::new(
            format!("steps[{idx}].response_topic.failure"),
            "At least one failure topic is required",
        ));
    }
    for (jdx, t) in step.response_topic.failure.iter().enumerate() {
        if !topic::is_failure_topic(t) {
            errors.push(ValidationError::new(
                format!("steps[{idx}].response_topic.failure[{jdx}]"),
                format!("'{t}' is not a failure-topic"),
            ));
        }
    }
}

fn validate_inputs(
    step: &crate::definition::StepDefinition,
    idx: usize,
    errors: &mut Vec<ValidationError>,
) {
    for (key, expr) in &step.input {
        if let Err(err) = template::parse_expression(expr) {
            errors.push(ValidationError::new(
                format!("steps[{idx}].input.{key}"),
                err.to_string(),
            ));
        }
    }
}

fn validate_dependencies(definition: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
    let step_names: HashSet<&str> = definition.steps.iter().map(|s| s.name.as_str()).collect();

    for (idx, step) in definition.steps.iter().enumerate() {
        for (jdx, dependency) in step.depends_on.iter().enumerate() {
            if step_names.contains(dependency.as_str()) {
                continue;
            }
            let mut error = ValidationError::new(
                format!("steps[{idx}].depends_on[{jdx}]"),
                format!("Unknown step '{dependency}' in depends_on"),
            );
            if let Some(similar) = find_similar_step(dependency, &step_names) {
                error = error.with_suggestion(format!("Did you mean '{similar}'?"));
            }
            errors.push(error);
        }
    }
}

/// Find a similar step name using Levenshtein distance
fn find_similar_step<'a>(target: &str, step_names: &HashSet<&'a str>) -> Option<&'a str> {
    let mut best_match: Option<&str> = None;
    let mut best_distance = usize::MAX;

    for &name in step_names {
        let distance = strsim::levenshtein(target, name);
        // Only suggest reasonably close names
        if distance < best_distance && distance <= 3 {
            best_distance = distance;
            best_match = Some(name);
        }
    }

    best_match
}

/// Validate the dependency graph is acyclic
fn validate_dag(definition: &WorkflowDefinition, errors: &mut Vec<ValidationError>) {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut node_indices = HashMap::new();

    for step in &definition.steps {
        let idx = graph.add_node(step.name.as_str());
        node_indices.insert(step.name.as_str(), idx);
    }

    for step in &definition.steps {
        for dependency in &step.depends_on {
            if dependency == &step.name {
                errors.push(ValidationError::new(
                    "steps",
                    format!("Step '{}' depends on itself", step.name),
                ));
                continue;
            }
            if let (Some(&from), Some(&to)) = (
                node_indices.get(dependency.as_str()),
                node_indices.get(step.name.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }
    }

    if algo::is_cyclic_directed(&graph) {
        let sccs = algo::kosaraju_scc(&graph);
        let cycle_nodes: Vec<&str> = sccs
            .iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| scc.iter().map(|&idx| graph[idx]).collect::<Vec<_>>())
            .unwrap_or_default();

        errors.push(ValidationError::new(
            "steps",
            format!(
                "Dependencies contain a cycle involving steps: {}",
                cycle_nodes.join(" -> ")
            ),
        ));
    }
}

/// Action names are interpreted by the registries at run time; unknown names
/// are reported but never rejected, since extensions register at startup.
fn warn_unknown_actions(definition: &WorkflowDefinition) {
    for step in &definition.steps {
        for descriptor in &step.on_success {
            if !SUCCESS_BUILTINS.contains(&descriptor.action.as_str()) {
                tracing::warn!(
                    workflow = %definition.name,
                    step = %step.name,
                    action = %descriptor.action,
                    "on_success action is not a built-in; ensure it is registered at startup"
                );
            }
        }
        if let Some(descriptor) = &step.on_failure {
            if !FAILURE_BUILTINS.contains(&descriptor.action.as_str()) {
                tracing::warn!(
                    workflow = %definition.name,
                    step = %step.name,
                    action = %descriptor.action,
                    "on_failure action is not a built-in; ensure it is registered at startup"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        ActionDescriptor, InitiatingEvent, ResponseTopics, StepDefinition,
    };
    use std::collections::BTreeMap;

    fn step(name: &str, ns: &str) -> StepDefinition {
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

    fn minimal_definition() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "orders".to_string(),
            description: None,
            version: "1.0.0".to_string(),
            initiating_event: InitiatingEvent {
                name: "OrderReceived".to_string(),
                topic: "shop.orders".to_string(),
            },
            steps: vec![step("Reserve", "inventory"), step("Charge", "billing")],
        }
    }

    fn error_paths(result: Result<(), ValidationErrors>) -> Vec<String> {
        result
            .expect_err("expected validation errors")
            .0
            .into_iter()
            .map(|e| e.path)
            .collect()
    }

    #[test]
    fn test_valid_definition() {
        assert!(validate_definition(&minimal_definition()).is_ok());
    }

    #[test]
    fn test_empty_name_and_bad_version() {
        let mut definition = minimal_definition();
        definition.name = String::new();
        definition.version = "1.0".to_string();

        let paths = error_paths(validate_definition(&definition));
        assert!(paths.contains(&"name".to_string()));
        assert!(paths.contains(&"version".to_string()));
    }

    #[test]
    fn test_requires_two_steps() {
        let mut definition = minimal_definition();
        definition.steps.truncate(1);

        let paths = error_paths(validate_definition(&definition));
        assert!(paths.contains(&"steps".to_string()));
    }

    #[test]
    fn test_step_name_must_be_alphanumeric() {
        let mut definition = minimal_definition();
        definition.steps[0].name = "re-serve".to_string();

        let paths = error_paths(validate_definition(&definition));
        assert!(paths.contains(&"steps[0].name".to_string()));
    }

    #[test]
    fn test_duplicate_step_names() {
        let mut definition = minimal_definition();
        definition.steps[1].name = "Reserve".to_string();

        let errors = validate_definition(&definition).unwrap_err();
        assert!(errors.0.iter().any(|e| e.message.contains("Duplicate")));
    }

    #[test]
    fn test_topic_discipline() {
        let mut definition = minimal_definition();
        definition.steps[0].topic = "inventory.success.run".to_string();
        definition.steps[0].response_topic.success = vec!["inventory.execute.run".to_string()];

        let paths = error_paths(validate_definition(&definition));
        assert!(paths.contains(&"steps[0].topic".to_string()));
        assert!(paths.contains(&"steps[0].response_topic.success[0]".to_string()));
    }

    #[test]
    fn test_response_topics_must_not_be_empty() {
        let mut definition = minimal_definition();
        definition.steps[0].response_topic.success.clear();

        let paths = error_paths(validate_definition(&definition));
        assert!(paths.contains(&"steps[0].response_topic.success".to_string()));
    }

    #[test]
    fn test_dangling_dependency_with_suggestion() {
        let mut definition = minimal_definition();
        definition.steps[1].depends_on = vec!["Rserve".to_string()];

        let errors = validate_definition(&definition).unwrap_err();
        let error = errors
            .0
            .iter()
            .find(|e| e.path == "steps[1].depends_on[0]")
            .unwrap();
        assert!(error
            .suggestion
            .as_ref()
            .is_some_and(|s| s.contains("Reserve")));
    }

    #[test]
    fn test_cycle_detection() {
        let mut definition = minimal_definition();
        definition.steps[0].depends_on = vec!["Charge".to_string()];
        definition.steps[1].depends_on = vec!["Reserve".to_string()];

        let errors = validate_definition(&definition).unwrap_err();
        assert!(errors.0.iter().any(|e| e.message.contains("cycle")));
    }

    #[test]
    fn test_self_dependency() {
        let mut definition = minimal_definition();
        definition.steps[0].depends_on = vec!["Reserve".to_string()];

        let errors = validate_definition(&definition).unwrap_err();
        assert!(errors.0.iter().any(|e| e.message.contains("itself")));
    }

    #[test]
    fn test_malformed_input_expression() {
        let mut definition = minimal_definition();
        definition.steps[0]
            .input
            .insert("k".to_string(), "just a literal".to_string());

        let paths = error_paths(validate_definition(&definition));
        assert!(paths.contains(&"steps[0].input.k".to_string()));
    }

    #[test]
    fn test_unknown_actions_warn_but_validate() {
        let mut definition = minimal_definition();
        definition.steps[0].on_success = vec![ActionDescriptor::bare("notify_oncall")];
        definition.steps[0].on_failure = Some(ActionDescriptor::bare("page_someone"));

        assert!(validate_definition(&definition).is_ok());
    }

    #[test]
    fn test_error_display() {
        let error = ValidationError::new("steps[0].topic", "not an execute-topic")
            .with_suggestion("Did you mean 'a.execute.b'?");
        let rendered = error.to_string();
        assert!(rendered.contains("steps[0].topic"));
        assert!(rendered.contains("Did you mean"));
    }
}
