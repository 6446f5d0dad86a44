//! Step state with transition guards

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ensemble_domain::{EventPayload, StepStatus};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised when a run-state mutation would break step monotonicity
#[derive(Debug, Error)]
pub enum StateTransitionError {
    /// The requested edge is not a legal status transition
    #[error("illegal step transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// A response was recorded for a step that was never dispatched
    #[error("step not tracked by this run: {0}")]
    StepNotFound(String),
}

// =============================================================================
// Step State
// =============================================================================

/// State of one step within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// Step name (or the initiating pseudo-step key)
    pub name: String,

    /// Current status
    pub status: StepStatus,

    /// Last observed reply envelope, or `None` while the step is in flight
    #[serde(default)]
    pub payload: Option<EventPayload>,
}

impl StepState {
    /// State for a freshly dispatched step
    #[must_use]
    pub fn ongoing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Ongoing,
            payload: None,
        }
    }

    /// State for a step with a recorded reply
    #[must_use]
    pub fn completed(name: impl Into<String>, status: StepStatus, payload: EventPayload) -> Self {
        Self {
            name: name.into(),
            status,
            payload: Some(payload),
        }
    }

    /// Check whether a transition to `target` is a legal edge.
    ///
    /// Statuses are monotone (`ongoing` to `success` or `failure`); the only
    /// way back is the retry reset from `failure` to `ongoing`.
    #[must_use]
    pub fn can_transition_to(&self, target: StepStatus) -> bool {
        use StepStatus::{Failure, Ongoing, Success};

        matches!(
            (self.status, target),
            (Ongoing, Success) | (Ongoing, Failure) | (Failure, Ongoing)
        )
    }
}
