//! YAML definition parser with structural validation
//!
//! Parses YAML workflow definitions and validates their structure including
//! topic discipline, dependency references, template inputs, and cycle
//! detection on the dependency DAG.

pub mod parser;
pub mod validator;

pub use parser::*;
pub use validator::*;
