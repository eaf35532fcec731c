//! # Ledger Node
//!
//! Runs the node core over in-memory subsystems.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults, then `LC_*` environment overrides)
//! 2. Initialize tracing
//! 3. Build the development genesis block
//! 4. Initialize subsystems (chain, pool, enabled indexes)
//! 5. Open the node (index catch-up, reconciler, tx forwarder)
//! 6. Wait for Ctrl+C, then close

use anyhow::{Context, Result};
use tracing::info;

use node_runtime::genesis::dev_genesis;
use node_runtime::telemetry::init_tracing;
use node_runtime::{Node, NodeConfig, SubsystemContainer};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("Invalid environment configuration")?;
    init_tracing(&config.telemetry).context("Failed to initialize tracing")?;
    config.validate().context("Invalid node configuration")?;

    info!("===========================================");
    info!("  Ledger Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let genesis = dev_genesis(&config.genesis);
    let container = SubsystemContainer::in_memory(&config, genesis)
        .context("Failed to initialize subsystems")?;
    let node = Node::from_container(config, &container).context("Failed to build node")?;
    node.open().await.context("Failed to open node")?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Initiating graceful shutdown...");
    node.close().await.context("Failed to close node")?;
    info!("Shutdown complete");
    Ok(())
}
