//! Shared harness: a node opened over in-memory subsystems with recording
//! relay and miner doubles.

#![allow(dead_code)]

use std::sync::Arc;

use node_runtime::adapters::{ChainAdapter, MempoolAdapter, RecordingMiner, RecordingRelay};
use node_runtime::ports::ChainPort;
use node_runtime::{Node, NodeConfig, SubsystemContainer};
use shared_types::test_utils::{address, genesis_block, next_block, next_block_with_nonce};
use shared_types::{Block, ChainEntry, OutPoint, Transaction};

pub const MINER: u8 = 9;

pub struct Harness {
    pub node: Node,
    pub chain: Arc<ChainAdapter>,
    pub mempool: Arc<MempoolAdapter>,
    pub relay: Arc<RecordingRelay>,
    pub miner: Arc<RecordingMiner>,
    pub genesis: Block,
}

impl Harness {
    pub async fn open(config: NodeConfig) -> Self {
        let genesis = genesis_block(&address(1));
        let relay = Arc::new(RecordingRelay::new());
        let miner = Arc::new(RecordingMiner::new());
        let container =
            SubsystemContainer::in_memory_with(&config, genesis.clone(), relay.clone(), miner.clone())
                .unwrap();
        let node = Node::from_container(config, &container).unwrap();
        node.open().await.unwrap();
        Self {
            node,
            chain: container.chain.clone(),
            mempool: container.mempool.clone(),
            relay,
            miner,
            genesis,
        }
    }

    pub async fn full() -> Self {
        Self::open(NodeConfig::full_for_testing()).await
    }

    /// The genesis coinbase output, paying `address(1)`.
    pub fn genesis_coin(&self) -> OutPoint {
        OutPoint::new(self.genesis.txs[0].hash(), 0)
    }

    /// Connects a block with `txs` on the tip and waits for reconciliation.
    pub async fn mine(&self, txs: Vec<Transaction>) -> (ChainEntry, Block) {
        let block = next_block(&self.chain.tip(), &address(MINER), txs);
        let entry = self.chain.connect_block(block.clone()).await.unwrap();
        self.node.flush().await.unwrap();
        (entry, block)
    }

    /// A block on `parent` that differs from any sibling mined by [`mine`].
    pub fn sibling(&self, parent: &ChainEntry, txs: Vec<Transaction>) -> Block {
        next_block_with_nonce(parent, &address(MINER), txs, 1)
    }

    pub async fn entry_at(&self, height: u32) -> ChainEntry {
        self.chain.get_entry_by_height(height).await.unwrap().unwrap()
    }
}
