//! Run state
//!
//! Per-run mutable state: the run status, one `StepState` per dispatched
//! step (plus the initiating pseudo-step), and the transition guards that
//! keep step statuses monotone.

pub mod run_state;
pub mod step_state;

pub use run_state::*;
pub use step_state::*;
