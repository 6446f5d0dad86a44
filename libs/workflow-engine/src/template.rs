//! Template resolver
//!
//! Step inputs are declared as single `{{Step.field}}` expressions and
//! resolved against the outputs recorded for already-completed steps.
//! Resolution is all-or-nothing: a step whose inputs cannot fully resolve is
//! never dispatched.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::StepState;

static EXPR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*(\w+)\.([\w\-]+)\s*\}\}$").expect("template regex is valid"));

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while resolving a step's input templates
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The expression is not a single `{{Step.field}}` reference
    #[error("not a single {{{{Step.field}}}} expression: {expr}")]
    Malformed { expr: String },

    /// The referenced step does not exist in the run state
    #[error("template references unknown step '{step}'")]
    UnknownStep { step: String },

    /// The referenced step has not recorded a payload yet
    #[error("step '{step}' has no recorded payload")]
    MissingPayload { step: String },

    /// The referenced output field is absent
    #[error("step '{step}' output has no field '{field}'")]
    MissingField { step: String, field: String },
}

// =============================================================================
// Expression Parsing
// =============================================================================

/// A parsed `{{Step.field}}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    /// Step whose output is referenced
    pub step: String,

    /// Field within that step's output
    pub field: String,
}

/// Parse a template expression, tolerating whitespace inside the braces
pub fn parse_expression(expr: &str) -> Result<TemplateRef, TemplateError> {
    let captures = EXPR_RE
        .captures(expr)
        .ok_or_else(|| TemplateError::Malformed {
            expr: expr.to_string(),
        })?;
    Ok(TemplateRef {
        step: captures[1].to_string(),
        field: captures[2].to_string(),
    })
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a step's declared inputs against recorded step states.
///
/// Pure function of `(inputs, steps)`: either every declared input resolves
/// or the first offending expression is returned as an error.
pub fn resolve_inputs(
    inputs: &BTreeMap<String, String>,
    steps: &HashMap<String, StepState>,
) -> Result<Map<String, Value>, TemplateError> {
    let mut resolved = Map::new();
    for (key, expr) in inputs {
        let reference = parse_expression(expr)?;
        let state = steps
            .get(&reference.step)
            .ok_or_else(|| TemplateError::UnknownStep {
                step: reference.step.clone(),
            })?;
        let payload = state
            .payload
            .as_ref()
            .ok_or_else(|| TemplateError::MissingPayload {
                step: reference.step.clone(),
            })?;
        let value = payload
            .output
            .get(&reference.field)
            .ok_or_else(|| TemplateError::MissingField {
                step: reference.step.clone(),
                field: reference.field.clone(),
            })?;
        resolved.insert(key.clone(), value.clone());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ensemble_domain::{EventPayload, StepStatus};

    fn steps_with_output(step: &str, output: Map<String, Value>) -> HashMap<String, StepState> {
        let mut steps = HashMap::new();
        steps.insert(
            step.to_string(),
            StepState {
                name: step.to_string(),
                status: StepStatus::Success,
                payload: Some(EventPayload::synthesize("wf-1", output)),
            },
        );
        steps
    }

    #[test]
    fn test_parse_expression() {
        let reference = parse_expression("{{Reserve.order_id}}").unwrap();
        assert_eq!(reference.step, "Reserve");
        assert_eq!(reference.field, "order_id");
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let reference = parse_expression("{{  Reserve.order_id  }}").unwrap();
        assert_eq!(reference.step, "Reserve");
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for expr in [
            "Reserve.order_id",
            "{{Reserve}}",
            "{{Reserve.a.b}}",
            "prefix {{Reserve.a}}",
            "{{Reserve.a}} suffix",
            "",
        ] {
            assert!(
                matches!(parse_expression(expr), Err(TemplateError::Malformed { .. })),
                "expected {expr:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_inputs() {
        let mut output = Map::new();
        output.insert("v".to_string(), Value::from(42));
        let steps = steps_with_output("S1", output);

        let mut inputs = BTreeMap::new();
        inputs.insert("k".to_string(), "{{S1.v}}".to_string());

        let resolved = resolve_inputs(&inputs, &steps).unwrap();
        assert_eq!(resolved["k"], Value::from(42));
    }

    #[test]
    fn test_resolve_unknown_step() {
        let steps = HashMap::new();
        let mut inputs = BTreeMap::new();
        inputs.insert("k".to_string(), "{{Ghost.v}}".to_string());

        assert_eq!(
            resolve_inputs(&inputs, &steps),
            Err(TemplateError::UnknownStep {
                step: "Ghost".to_string()
            })
        );
    }

    #[test]
    fn test_resolve_missing_field() {
        let mut output = Map::new();
        output.insert("v".to_string(), Value::from(42));
        let steps = steps_with_output("S1", output);

        let mut inputs = BTreeMap::new();
        inputs.insert("k".to_string(), "{{S1.missing}}".to_string());

        assert_eq!(
            resolve_inputs(&inputs, &steps),
            Err(TemplateError::MissingField {
                step: "S1".to_string(),
                field: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_resolve_missing_payload() {
        let mut steps = HashMap::new();
        steps.insert(
            "S1".to_string(),
            StepState {
                name: "S1".to_string(),
                status: StepStatus::Ongoing,
                payload: None,
            },
        );
        let mut inputs = BTreeMap::new();
        inputs.insert("k".to_string(), "{{S1.v}}".to_string());

        assert_eq!(
            resolve_inputs(&inputs, &steps),
            Err(TemplateError::MissingPayload {
                step: "S1".to_string()
            })
        );
    }

    #[test]
    fn test_empty_inputs_resolve_to_empty_object() {
        let resolved = resolve_inputs(&BTreeMap::new(), &HashMap::new()).unwrap();
        assert!(resolved.is_empty());
    }
}
