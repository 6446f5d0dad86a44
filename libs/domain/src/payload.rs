//! Event payload envelope
//!
//! Standard reply envelope carried on response topics. Initiating messages
//! arrive as bare JSON; the mediator synthesizes an envelope around them so
//! the initiating pseudo-step looks like any other completed step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Event Payload
// =============================================================================

/// Reply envelope on the wire: `{workflow_id, timestamp, success, output}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Opaque identifier of the run this reply belongs to
    pub workflow_id: String,

    /// When the reply was produced (ISO-8601)
    pub timestamp: DateTime<Utc>,

    /// Whether the step succeeded
    pub success: bool,

    /// Step output fields, referenced by `{{Step.field}}` templates
    pub output: Map<String, Value>,
}

impl EventPayload {
    /// Synthesize the envelope for an initiating event.
    ///
    /// The raw initiating message is the `output`; the envelope is marked
    /// successful and stamped with the current time.
    #[must_use]
    pub fn synthesize(workflow_id: impl Into<String>, output: Map<String, Value>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            timestamp: Utc::now(),
            success: true,
            output,
        }
    }

    /// Parse an envelope from raw bytes, validating the wire schema
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
