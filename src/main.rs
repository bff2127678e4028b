// Argus - Distributed video-analytics control plane
// Main entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use argus::brain::Brain;
use argus::bus::NatsBus;
use argus::config::{load_brain_config, load_worker_config};
use argus::eventdb::MongoEventStore;
use argus::store::RedisStore;
use argus::worker::{IdlePipeline, Worker};

#[derive(Parser)]
#[command(name = "argus", version, about = "Distributed video-analytics control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a brain: the coordinator for one analyzer type.
    Brain {
        /// Analyzer type this brain handles (e.g. "tripwire").
        #[arg(long)]
        typename: String,
        /// Optional JSON config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a worker protocol client with the placeholder pipeline.
    Worker {
        /// Application name (event app_name, shared-dir layout).
        #[arg(long)]
        name: String,
        /// Worker id assigned by the resource manager.
        #[arg(long)]
        worker_id: String,
        /// Optional JSON config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Brain { typename, config } => run_brain(&typename, config.as_deref()).await,
        Command::Worker { name, worker_id, config } => run_worker(&name, &worker_id, config.as_deref()).await,
    }
}

async fn run_brain(typename: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_brain_config(typename, config_path)?;

    let bus = Arc::new(NatsBus::connect(&config.mq_host).await?);
    let store = Arc::new(RedisStore::connect(&config.mem_db_host).await?);
    let event_db = Arc::new(
        MongoEventStore::connect(&config.event_db_host, &config.event_db_name, &config.typename).await?,
    );

    let brain = Brain::new(&config, bus, store, event_db);
    let cancel = brain.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping brain");
            cancel.cancel();
        }
    });

    brain.run().await
}

async fn run_worker(name: &str, worker_id: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_worker_config(name, worker_id, config_path)?;

    let bus = Arc::new(NatsBus::connect(&config.mq_host).await?);
    let store = Arc::new(RedisStore::connect(&config.mem_db_host).await?);

    let mut worker = Worker::new(&config, bus, store);
    worker.register_pipeline(Box::new(IdlePipeline));
    let cancel = worker.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping worker");
            cancel.cancel();
        }
    });

    worker.run().await
}
