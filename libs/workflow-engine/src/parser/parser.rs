//! YAML definition parser
//!
//! Parses YAML strings into validated `WorkflowDefinition` structures.

use thiserror::Error;

use crate::definition::WorkflowDefinition;

use super::validator::{validate_definition, ValidationErrors};

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur while parsing a definition file
#[derive(Debug, Error)]
pub enum ParseError {
    /// YAML parsing failed
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// Structural validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

// =============================================================================
// Parser Functions
// =============================================================================

/// Parse a YAML workflow definition string
///
/// # Arguments
/// * `yaml` - The YAML string to parse
///
/// # Returns
/// The validated `WorkflowDefinition` or a `ParseError`
pub fn parse_definition(yaml: &str) -> Result<WorkflowDefinition, ParseError> {
    let definition: WorkflowDefinition = serde_yml::from_str(yaml)?;
    validate_definition(&definition)?;
    Ok(definition)
}
