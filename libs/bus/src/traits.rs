//! Message bus trait definition

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

/// Errors from the bus backend
#[derive(Debug, Error)]
pub enum BusError {
    /// Failed to connect to NATS
    #[error("NATS connect failed: {0}")]
    Connection(#[from] async_nats::ConnectError),

    /// Failed to publish a message
    #[error("NATS publish failed: {0}")]
    Publish(#[from] async_nats::PublishError),

    /// Failed to subscribe to a topic
    #[error("NATS subscribe failed: {0}")]
    Subscribe(#[from] async_nats::SubscribeError),
}

// =============================================================================
// Messages and Topics
// =============================================================================

/// A message delivered to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message arrived on
    pub topic: String,

    /// Raw message payload
    pub payload: Vec<u8>,
}

/// Settings for topic creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name
    pub name: String,

    /// Partition count requested at creation
    pub partitions: i32,

    /// Replication factor requested at creation
    pub replication: i16,
}

/// Stream of messages for one consumer
pub type BusStream = BoxStream<'static, BusMessage>;

// =============================================================================
// Message Bus Trait
// =============================================================================

/// Capability set the mediator requires from a message bus.
///
/// Delivery is at-least-once; duplicate and reordered messages are the
/// consumer's problem (the engine's idempotency gate absorbs them).
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Enumerate the topics the bus currently knows about
    async fn list_topics(&self) -> Result<Vec<String>, BusError>;

    /// Create a topic with the given settings.
    ///
    /// Creating a topic that already exists is a no-op.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BusError>;

    /// Publish a byte payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribe to a topic in a named consumer group.
    ///
    /// Messages on the topic are load-balanced across the group's members.
    /// Dropping the returned stream ends the subscription.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<BusStream, BusError>;
}
