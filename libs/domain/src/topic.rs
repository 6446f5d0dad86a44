//! Topic-name discipline
//!
//! Bus topics follow `<ns>.(execute|success|failure).<action>`, where both the
//! namespace and the action segment match `[\w\-/:]+`. The middle segment
//! classifies the topic; anything else is not a workflow topic.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TOPIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w\-/:]+\.(success|failure|execute)\.[\w\-/:]+$")
        .expect("topic regex is valid")
});

// =============================================================================
// Topic Kind
// =============================================================================

/// Classification of a workflow topic by its middle segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    /// Outbound topic a step publishes its resolved inputs to
    Execute,

    /// Inbound topic carrying a successful step reply
    Success,

    /// Inbound topic carrying a failed step reply
    Failure,
}

impl TopicKind {
    /// The middle topic segment for this kind
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Classify a topic string by the topic-name discipline.
///
/// Returns `None` for strings that do not match
/// `<ns>.(execute|success|failure).<action>`.
#[must_use]
pub fn classify(topic: &str) -> Option<TopicKind> {
    let captures = TOPIC_RE.captures(topic)?;
    match captures.get(1).map(|m| m.as_str()) {
        Some("execute") => Some(TopicKind::Execute),
        Some("success") => Some(TopicKind::Success),
        Some("failure") => Some(TopicKind::Failure),
        _ => None,
    }
}

/// Check whether `topic` is an execute-topic
#[must_use]
pub fn is_execute_topic(topic: &str) -> bool {
    classify(topic) == Some(TopicKind::Execute)
}

/// Check whether `topic` is a success-topic
#[must_use]
pub fn is_success_topic(topic: &str) -> bool {
    classify(topic) == Some(TopicKind::Success)
}

/// Check whether `topic` is a failure-topic
#[must_use]
pub fn is_failure_topic(topic: &str) -> bool {
    classify(topic) == Some(TopicKind::Failure)
}
