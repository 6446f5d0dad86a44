//! Ensemble Mediator - process entry point
//!
//! Loads every workflow definition from the configured directory, provisions
//! the referenced bus topics, subscribes one consumer per topic, and routes
//! events until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use ensemble_bus::{NatsBus, NatsConfig};
use ensemble_common::{init_tracing, LogFormat};
use ensemble_store::{RedisConfig, RedisStateStore};
use ensemble_workflow_engine::{load_dir, Mediator, MediatorConfig};

#[derive(Debug, Parser)]
#[command(name = "ensemble-mediator", about = "Event-driven workflow mediator")]
struct Args {
    /// Directory of workflow definition files
    #[arg(long, env = "ENSEMBLE_DEFINITIONS_DIR", default_value = "definitions")]
    definitions_dir: PathBuf,

    /// NATS server URL
    #[arg(long, env = "ENSEMBLE_NATS_URL", default_value = "nats://localhost:4222")]
    nats_url: String,

    /// Redis server URL for run state and retry counters
    #[arg(long, env = "ENSEMBLE_REDIS_URL", default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Partition count for topics the mediator creates
    #[arg(long, env = "ENSEMBLE_TOPIC_PARTITIONS", default_value_t = 1)]
    topic_partitions: i32,

    /// Replication factor for topics the mediator creates
    #[arg(long, env = "ENSEMBLE_TOPIC_REPLICATION", default_value_t = 1)]
    topic_replication: i16,

    /// Consumer group prefix
    #[arg(long, env = "ENSEMBLE_GROUP_PREFIX", default_value = "mediator")]
    group_prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());
    let args = Args::parse();

    let definitions = load_dir(&args.definitions_dir).with_context(|| {
        format!(
            "loading definitions from {}",
            args.definitions_dir.display()
        )
    })?;
    anyhow::ensure!(
        !definitions.is_empty(),
        "no valid workflow definitions in {}",
        args.definitions_dir.display()
    );
    tracing::info!(count = definitions.len(), "workflow definitions loaded");

    let bus = Arc::new(
        NatsBus::connect(&NatsConfig {
            url: args.nats_url.clone(),
            ..NatsConfig::default()
        })
        .await
        .context("connecting to NATS")?,
    );
    let store = Arc::new(
        RedisStateStore::connect(&RedisConfig {
            url: args.redis_url.clone(),
            ..RedisConfig::default()
        })
        .context("connecting to Redis")?,
    );

    let mediator = Mediator::new(
        bus,
        store,
        definitions,
        MediatorConfig {
            group_prefix: args.group_prefix,
            topic_partitions: args.topic_partitions,
            topic_replication: args.topic_replication,
        },
    )?;

    mediator.provision_topics().await?;
    mediator.subscribe_all().await?;
    tracing::info!("mediator running; waiting for events");

    wait_for_signal().await;
    mediator.shutdown().await;
    Ok(())
}

/// Block until SIGINT or SIGTERM arrives
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT; shutting down"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM; shutting down"),
    }
}
