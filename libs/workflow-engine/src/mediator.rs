//! Bus dispatcher / mediator
//!
//! Owns the topic surface of the loaded definitions: provisions missing
//! topics, opens one consumer per distinct topic in a stable group, routes
//! initiating messages to run creation and reply messages to run
//! continuation, and shuts the consumers down on signal.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use ensemble_bus::{BusError, BusStream, MessageBus, TopicSpec};
use ensemble_domain::EventPayload;
use ensemble_store::StateStore;

use crate::definition::WorkflowDefinition;
use crate::runner::RunEngine;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while assembling or operating the mediator
#[derive(Debug, Error)]
pub enum MediatorError {
    /// Two workflows share an initiating topic
    #[error("workflows '{first}' and '{second}' share initiating topic '{topic}'")]
    DuplicateInitiatingTopic {
        topic: String,
        first: String,
        second: String,
    },

    /// Two workflows share a name
    #[error("two workflow definitions are named '{0}'")]
    DuplicateWorkflowName(String),

    /// The bus failed
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Mediator settings
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Consumer groups are named `<group_prefix>-<topic>`
    pub group_prefix: String,

    /// Partition count for topics the mediator creates
    pub topic_partitions: i32,

    /// Replication factor for topics the mediator creates
    pub topic_replication: i16,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            group_prefix: String::from("mediator"),
            topic_partitions: 1,
            topic_replication: 1,
        }
    }
}

// =============================================================================
// Mediator
// =============================================================================

/// Routes bus traffic for every loaded workflow definition
pub struct Mediator {
    engine: Arc<RunEngine>,
    bus: Arc<dyn MessageBus>,
    definitions: Vec<Arc<WorkflowDefinition>>,
    by_initiating_topic: HashMap<String, Arc<WorkflowDefinition>>,
    config: MediatorConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Mediator {
    /// Index the definitions and build the run engine.
    ///
    /// Fails if two workflows share a name or an initiating topic; both
    /// would make message routing ambiguous.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn StateStore>,
        definitions: Vec<WorkflowDefinition>,
        config: MediatorConfig,
    ) -> Result<Self, MediatorError> {
        let definitions: Vec<Arc<WorkflowDefinition>> =
            definitions.into_iter().map(Arc::new).collect();

        let mut names: HashSet<&str> = HashSet::new();
        for definition in &definitions {
            if !names.insert(definition.name.as_str()) {
                return Err(MediatorError::DuplicateWorkflowName(
                    definition.name.clone(),
                ));
            }
        }

        let mut by_initiating_topic: HashMap<String, Arc<WorkflowDefinition>> = HashMap::new();
        for definition in &definitions {
            let topic = definition.initiating_event.topic.clone();
            if let Some(previous) = by_initiating_topic.get(&topic) {
                return Err(MediatorError::DuplicateInitiatingTopic {
                    topic,
                    first: previous.name.clone(),
                    second: definition.name.clone(),
                });
            }
            by_initiating_topic.insert(topic, Arc::clone(definition));
        }

        let engine = Arc::new(RunEngine::new(
            store,
            Arc::clone(&bus),
            definitions.iter().map(Arc::clone),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            engine,
            bus,
            definitions,
            by_initiating_topic,
            config,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The run engine, for introspection and tests
    #[must_use]
    pub fn engine(&self) -> Arc<RunEngine> {
        Arc::clone(&self.engine)
    }

    /// Every topic any loaded definition references
    #[must_use]
    pub fn referenced_topics(&self) -> BTreeSet<String> {
        self.definitions
            .iter()
            .flat_map(|d| d.referenced_topics())
            .collect()
    }

    /// Topics the mediator consumes from: initiating topics plus every
    /// response topic. Execute topics are outbound only.
    fn consumed_topics(&self) -> BTreeSet<String> {
        let mut topics: BTreeSet<String> =
            self.by_initiating_topic.keys().cloned().collect();
        for definition in &self.definitions {
            for step in &definition.steps {
                topics.extend(step.response_topic.success.iter().cloned());
                topics.extend(step.response_topic.failure.iter().cloned());
            }
        }
        topics
    }

    /// Create every referenced topic the bus does not already have
    pub async fn provision_topics(&self) -> Result<(), MediatorError> {
        let existing: BTreeSet<String> = self.bus.list_topics().await?.into_iter().collect();

        for topic in self.referenced_topics() {
            if existing.contains(&topic) {
                continue;
            }
            self.bus
                .create_topic(&TopicSpec {
                    name: topic.clone(),
                    partitions: self.config.topic_partitions,
                    replication: self.config.topic_replication,
                })
                .await?;
            tracing::info!(%topic, "created missing topic");
        }
        Ok(())
    }

    /// Open one consumer per distinct consumed topic and start routing
    pub async fn subscribe_all(&self) -> Result<(), MediatorError> {
        for topic in self.consumed_topics() {
            let group = format!("{}-{}", self.config.group_prefix, topic);
            let stream = self.bus.subscribe(&topic, &group).await?;

            let route = match self.by_initiating_topic.get(&topic) {
                Some(definition) => {
                    if self
                        .definitions
                        .iter()
                        .any(|d| d.steps.iter().any(|s| {
                            s.response_topic.success.contains(&topic)
                                || s.response_topic.failure.contains(&topic)
                        }))
                    {
                        tracing::warn!(
                            %topic,
                            workflow = %definition.name,
                            "topic is both initiating and a response topic; treating as initiating"
                        );
                    }
                    Route::Initiate(Arc::clone(definition))
                }
                None => Route::Response,
            };

            let handle = tokio::spawn(consume(
                stream,
                route,
                Arc::clone(&self.engine),
                self.shutdown_tx.subscribe(),
                topic.clone(),
            ));
            self.tasks.lock().expect("task list poisoned").push(handle);
            tracing::info!(%topic, %group, "consumer subscribed");
        }
        Ok(())
    }

    /// Stop all consumers and wait for them to drain. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().expect("task list poisoned");
            guard.drain(..).collect()
        };
        for result in futures::future::join_all(tasks).await {
            if let Err(err) = result {
                tracing::warn!(error = %err, "consumer task ended abnormally");
            }
        }
        tracing::info!("mediator shut down");
    }
}

// =============================================================================
// Consumer Loop
// =============================================================================

enum Route {
    Initiate(Arc<WorkflowDefinition>),
    Response,
}

async fn consume(
    mut stream: BusStream,
    route: Route,
    engine: Arc<RunEngine>,
    mut shutdown: watch::Receiver<bool>,
    topic: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe = stream.next() => {
                let Some(message) = maybe else { break };
                match &route {
                    Route::Initiate(definition) => {
                        match engine.init_run(definition, &message.payload).await {
                            Ok(Some(workflow_id)) => tracing::debug!(
                                %topic,
                                %workflow_id,
                                workflow = %definition.name,
                                "initiating message accepted"
                            ),
                            Ok(None) => {}
                            Err(err) => tracing::error!(
                                %topic,
                                error = %err,
                                "failed to initiate run"
                            ),
                        }
                    }
                    Route::Response => match EventPayload::from_slice(&message.payload) {
                        Ok(payload) => {
                            if let Err(err) = engine.continue_run(&message.topic, payload).await {
                                tracing::error!(%topic, error = %err, "failed to process reply");
                            }
                        }
                        Err(err) => {
                            tracing::warn!(%topic, error = %err, "invalid event payload dropped");
                        }
                    },
                }
            }
        }
    }
    tracing::debug!(%topic, "consumer stopped");
}
