//! Workflow definition model
//!
//! The immutable shape of a loaded workflow: initiating event, steps with
//! templated inputs and dependency edges, response topics, and action
//! descriptors.

pub mod types;

pub use types::*;
