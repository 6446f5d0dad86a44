//! Status enums shared across the workflow engine

use serde::{Deserialize, Serialize};

// =============================================================================
// Run Status
// =============================================================================

/// Status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// The run has steps still ongoing or not yet dispatched
    InProgress,

    /// Every declared step completed successfully (or a skip rescued the run)
    Success,

    /// A step failed and no recovery action superseded it
    Failed,
}

impl RunStatus {
    /// Check if this is a terminal status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

// =============================================================================
// Step Status
// =============================================================================

/// Status of a single step within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Dispatched, awaiting a reply on one of its response topics
    Ongoing,

    /// A success reply was recorded
    Success,

    /// A failure reply was recorded
    Failure,
}

impl StepStatus {
    /// Check if this is a terminal status
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// The status name as it appears on the wire and in state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}
