//! In-memory bus for tests and local development
//!
//! Mimics the broker contract closely enough for end-to-end engine tests:
//! named topics, queue-group load balancing (round-robin within a group),
//! and a publish log so tests can assert on outbound traffic.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::traits::{BusError, BusMessage, BusStream, MessageBus, TopicSpec};

#[derive(Default)]
struct Inner {
    topics: HashSet<String>,
    groups: HashMap<(String, String), GroupState>,
    publish_log: HashMap<String, Vec<Vec<u8>>>,
}

struct GroupState {
    senders: Vec<mpsc::UnboundedSender<BusMessage>>,
    cursor: usize,
}

/// Broker stand-in holding all topics and subscriptions in process memory
#[derive(Default)]
pub struct InMemoryBus {
    inner: Mutex<Inner>,
}

impl InMemoryBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published to `topic`, in publish order.
    ///
    /// Test helper; production code never looks at the log.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .expect("bus lock poisoned")
            .publish_log
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn list_topics(&self) -> Result<Vec<String>, BusError> {
        let inner = self.inner.lock().expect("bus lock poisoned");
        let mut topics: Vec<String> = inner.topics.iter().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BusError> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.topics.insert(spec.name.clone());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.topics.insert(topic.to_string());
        inner
            .publish_log
            .entry(topic.to_string())
            .or_default()
            .push(payload.clone());

        // One delivery per subscribed group, round-robin within the group
        for ((t, _), group) in &mut inner.groups {
            if t.as_str() != topic || group.senders.is_empty() {
                continue;
            }
            let message = BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            let start = group.cursor;
            for offset in 0..group.senders.len() {
                let idx = (start + offset) % group.senders.len();
                if group.senders[idx].send(message.clone()).is_ok() {
                    group.cursor = (idx + 1) % group.senders.len();
                    break;
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<BusStream, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.topics.insert(topic.to_string());
        inner
            .groups
            .entry((topic.to_string(), group.to_string()))
            .or_insert_with(|| GroupState {
                senders: Vec::new(),
                cursor: 0,
            })
            .senders
            .push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}
