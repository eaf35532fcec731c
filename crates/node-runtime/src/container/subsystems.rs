//! # In-Memory Subsystems
//!
//! Builds every collaborator in dependency order:
//!
//! ```text
//! chain (lc-02) ──→ mempool (lc-01) ──→ indexes (lc-03, per config flag)
//! ```
//!
//! Relay and miner are supplied by the caller; [`SubsystemContainer::in_memory`]
//! uses the logging relay and a miner that ignores notifications.

use std::sync::Arc;

use lc_01_mempool::SystemTimeSource;
use lc_03_indexing::{AddrIndex, TokenIndex, TxIndex};
use shared_bus::InMemoryEventBus;
use shared_types::{display_hash, Block};
use tracing::info;

use crate::adapters::{
    AddrIndexAdapter, ChainAdapter, LoggingRelay, MempoolAdapter, NoOpMiner, TokenIndexAdapter,
    TxIndexAdapter,
};
use crate::container::config::NodeConfig;
use crate::container::Collaborators;
use crate::error::NodeError;
use crate::ports::{AddrIndexPort, ChainPort, MinerPort, RelayPort, TokenIndexPort, TxIndexPort};

pub struct SubsystemContainer {
    /// Concrete chain, kept for driving it directly (tests, block import).
    pub chain: Arc<ChainAdapter>,
    pub mempool: Arc<MempoolAdapter>,
    pub collaborators: Collaborators,
    pub bus: Arc<InMemoryEventBus>,
}

impl SubsystemContainer {
    pub fn in_memory(config: &NodeConfig, genesis: Block) -> Result<Self, NodeError> {
        Self::in_memory_with(
            config,
            genesis,
            Arc::new(LoggingRelay::new()),
            Arc::new(NoOpMiner),
        )
    }

    pub fn in_memory_with(
        config: &NodeConfig,
        genesis: Block,
        relay: Arc<dyn RelayPort>,
        miner: Arc<dyn MinerPort>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let chain = Arc::new(ChainAdapter::new(genesis));
        let mempool = Arc::new(MempoolAdapter::new(
            config.mempool.clone(),
            chain.clone(),
            Arc::new(SystemTimeSource),
        ));

        let indexes = &config.indexes;
        let tx_index: Option<Arc<dyn TxIndexPort>> = indexes
            .tx_index
            .then(|| Arc::new(TxIndexAdapter::new(TxIndex::new())) as Arc<dyn TxIndexPort>);
        let addr_index: Option<Arc<dyn AddrIndexPort>> = indexes.addr_index.then(|| {
            Arc::new(AddrIndexAdapter::new(AddrIndex::new(indexes.max_txs))) as Arc<dyn AddrIndexPort>
        });
        let token_index: Option<Arc<dyn TokenIndexPort>> = indexes.token_index.then(|| {
            Arc::new(TokenIndexAdapter::new(TokenIndex::new())) as Arc<dyn TokenIndexPort>
        });

        info!(
            genesis = %display_hash(&chain.tip().hash),
            tx_index = indexes.tx_index,
            addr_index = indexes.addr_index,
            token_index = indexes.token_index,
            "[node] Subsystems initialized"
        );

        let collaborators = Collaborators {
            chain: chain.clone(),
            mempool: mempool.clone(),
            tx_index,
            addr_index,
            token_index,
            relay,
            miner,
        };

        Ok(Self {
            chain,
            mempool,
            collaborators,
            bus: Arc::new(InMemoryEventBus::with_capacity(config.bus.capacity)),
        })
    }
}
