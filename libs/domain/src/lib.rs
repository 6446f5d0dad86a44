//! Ensemble Domain - Core domain models and types
//!
//! This crate contains the topic-name discipline, the event payload envelope,
//! and the status enums shared by every Ensemble crate. Pure types, no I/O.

pub mod enums;
pub mod payload;
pub mod topic;

pub use enums::*;
pub use payload::*;
pub use topic::*;
