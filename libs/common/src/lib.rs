//! Common utilities for Ensemble
//!
//! Provides shared telemetry initialization for the mediator process.

pub mod telemetry;

pub use telemetry::{init_tracing, LogFormat};
