//! Chain Node
//!
//! Runs one chain: loads or creates its state, starts the engine and
//! serves JSON-RPC until Ctrl+C. State in the data directory survives
//! restarts.

use anyhow::Result;
use chain_runtime::{Engine, ProcessorRegistry};
use chain_types::ChainId;
use clap::Parser;
use rpc_server::{methods::RpcContext, HttpRpcServer};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{broadcast::error::RecvError, oneshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vstate::{MemoryDb, SledDb, StateDb};

mod config;

use config::NodeConfig;

/// Deterministic chain execution node
#[derive(Parser, Debug)]
#[command(name = "chain-node")]
#[command(about = "Single-chain node with batch execution and JSON-RPC", long_about = None)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP RPC bind address
    #[arg(long)]
    rpc_addr: Option<String>,

    /// Data directory for persistent state
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep state in memory only
    #[arg(long)]
    in_memory: bool,

    /// Chain id (base58)
    #[arg(long)]
    chain_id: Option<ChainId>,

    /// Scheduler poll interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Config file (or defaults) with command line overrides applied
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        if let Some(addr) = &self.rpc_addr {
            config.rpc.http_addr = addr.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(chain_id) = self.chain_id {
            config.engine.chain_id = chain_id;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.engine.poll_interval_ms = ms;
        }
        config.in_memory |= self.in_memory;
        config.engine.verbose |= self.verbose;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(args.node_config()?).await
}

async fn run(config: NodeConfig) -> Result<()> {
    tracing::info!("Starting chain node");
    tracing::info!("  Chain: {}", config.engine.chain_id);
    tracing::info!("  Owner: {}", config.engine.chain_owner);
    tracing::info!("  Poll interval: {}ms", config.engine.poll_interval_ms);
    if config.rpc.enabled {
        tracing::info!("  HTTP RPC: {}", config.rpc.http_addr);
    }

    let (db, sled): (Arc<dyn StateDb>, Option<Arc<SledDb>>) = if config.in_memory {
        tracing::info!("  State: in memory");
        (Arc::new(MemoryDb::new()), None)
    } else {
        tracing::info!("  Data directory: {:?}", config.data_dir);
        std::fs::create_dir_all(&config.data_dir)?;
        let sled = Arc::new(SledDb::open(config.data_dir.join("state"))?);
        if let Some(meta) = sled.load_metadata()? {
            tracing::info!(
                "Found existing state at block {} ({} keys)",
                meta.block_index,
                sled.key_count()
            );
        } else {
            tracing::info!("No existing state found, starting fresh");
        }
        (sled.clone(), Some(sled))
    };

    let processors = ProcessorRegistry::new().with(inccounter::interface());
    let engine = Arc::new(Engine::new(config.engine.clone(), db, processors)?);
    engine.start()?;

    // Log a summary of committed blocks
    let mut updates = engine.subscribe();
    let log_interval = config.log_interval.max(1);
    let update_handler = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) if !update.is_done() => {
                    tracing::warn!(
                        "Block {} not committed: {}",
                        update.block_index,
                        update.error.as_deref().unwrap_or("unknown error")
                    );
                }
                Ok(update) => {
                    if update.block_index % log_interval == 0 {
                        tracing::info!(
                            "Block {}: state {} ({} requests)",
                            update.block_index,
                            update.state_hash,
                            update.results.len()
                        );
                    }
                }
                Err(RecvError::Lagged(n)) => tracing::debug!("Update log skipped {} batches", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Start HTTP RPC server
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let http_server = if config.rpc.enabled {
        let context = Arc::new(RpcContext { engine: engine.clone() });
        let addr = config.rpc.http_addr.clone();
        Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = HttpRpcServer::new(context).run(&addr, shutdown).await {
                tracing::error!("HTTP RPC server error: {}", e);
            }
        }))
    } else {
        None
    };

    tracing::info!("Chain node running at block {:?}", engine.block_index());
    tracing::info!("Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");

    let _ = shutdown_tx.send(());
    if let Some(server) = http_server {
        if let Err(e) = server.await {
            tracing::error!("HTTP RPC task failed: {}", e);
        }
    }

    engine.join().await;
    update_handler.abort();

    let left = engine.backlog_len();
    if left > 0 {
        tracing::warn!("{} requests left unprocessed in the backlog", left);
    }
    if let Some(sled) = sled {
        if let Err(e) = sled.flush() {
            tracing::error!("Failed to flush state: {}", e);
        }
    }

    tracing::info!(
        "Node stopped at block {:?}, state {}",
        engine.block_index(),
        engine.state_hash()
    );

    Ok(())
}
