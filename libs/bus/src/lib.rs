//! Ensemble Bus - message bus abstraction for the workflow mediator
//!
//! The mediator needs four capabilities from a bus: enumerate topics, create
//! topics, publish a byte payload, and subscribe to a topic in a named
//! consumer group with at-least-once delivery. `MessageBus` captures that
//! contract; `NatsBus` implements it over NATS queue groups and
//! `InMemoryBus` implements it for tests and local development.

pub mod memory;
pub mod nats;
pub mod traits;

pub use memory::InMemoryBus;
pub use nats::{NatsBus, NatsConfig};
pub use traits::{BusError, BusMessage, BusStream, MessageBus, TopicSpec};
