//! Success and failure action registries
//!
//! Actions are named operations evaluated when a step reply arrives: the
//! ordered `on_success` list or the single `on_failure` descriptor. Two
//! registries exist, one per outcome, each preloaded with built-ins and open
//! for extension at startup.

pub mod builtin;
pub mod registry;

pub use builtin::*;
pub use registry::*;
