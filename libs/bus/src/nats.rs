//! NATS-backed message bus
//!
//! Consumer groups map onto NATS queue groups, which load-balance deliveries
//! across members the same way broker consumer groups do. Core NATS creates
//! subjects implicitly on first use, so `create_topic` only records the
//! mediator's provisioning intent and `list_topics` reports what has been
//! recorded so far.

use std::collections::HashSet;
use std::sync::Mutex;

use async_nats::Client;
use async_trait::async_trait;
use futures::StreamExt;

use crate::traits::{BusError, BusMessage, BusStream, MessageBus, TopicSpec};

/// Configuration for the NATS connection
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL
    pub url: String,

    /// Connection name reported to the server; shows up in NATS monitoring
    /// so operators can tell mediator connections apart
    pub client_name: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: String::from("nats://localhost:4222"),
            client_name: String::from("ensemble-mediator"),
        }
    }
}

/// Message bus backed by a NATS client
pub struct NatsBus {
    client: Client,
    provisioned: Mutex<HashSet<String>>,
}

impl NatsBus {
    /// Connect to the NATS server named in `config`
    pub async fn connect(config: &NatsConfig) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connect(&config.url)
            .await?;
        Ok(Self {
            client,
            provisioned: Mutex::new(HashSet::new()),
        })
    }

    /// Wrap an already-connected client
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            provisioned: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn list_topics(&self) -> Result<Vec<String>, BusError> {
        let provisioned = self.provisioned.lock().expect("provisioned lock poisoned");
        let mut topics: Vec<String> = provisioned.iter().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BusError> {
        // Subjects need no broker-side creation; partition and replication
        // settings have no NATS equivalent.
        tracing::debug!(topic = %spec.name, "registering subject");
        self.provisioned
            .lock()
            .expect("provisioned lock poisoned")
            .insert(spec.name.clone());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client.publish(topic.to_string(), payload.into()).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<BusStream, BusError> {
        let subscriber = self
            .client
            .queue_subscribe(topic.to_string(), group.to_string())
            .await?;
        Ok(Box::pin(subscriber.map(|message| BusMessage {
            topic: message.subject.to_string(),
            payload: message.payload.to_vec(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_identify_the_mediator() {
        let config = NatsConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.client_name, "ensemble-mediator");
    }
}
