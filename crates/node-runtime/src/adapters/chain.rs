//! # Chain Adapter
//!
//! Wraps the in-memory [`ChainStore`] and forwards its lifecycle events to
//! the attached sink after each state change.

use std::sync::Arc;

use async_trait::async_trait;
use lc_02_chain::ChainStore;
use parking_lot::RwLock;
use shared_bus::ChainEvent;
use shared_types::{display_hash, Block, ChainEntry, Coin, CoinView, Hash, OutPoint};
use tracing::{debug, info};

use crate::error::NodeError;
use crate::ports::{ChainEventSink, ChainPort};

pub struct ChainAdapter {
    store: RwLock<ChainStore>,
    sink: RwLock<Option<Arc<dyn ChainEventSink>>>,
    /// Held from mutation through delivery so events reach the sink in the
    /// order the store applied them.
    ordering: tokio::sync::Mutex<()>,
}

impl ChainAdapter {
    pub fn new(genesis: Block) -> Self {
        let store = ChainStore::new(genesis);
        info!(
            genesis = %display_hash(&store.genesis_hash()),
            "[lc-02] Chain initialized"
        );
        Self {
            store: RwLock::new(store),
            sink: RwLock::new(None),
            ordering: tokio::sync::Mutex::new(()),
        }
    }

    pub fn height(&self) -> u32 {
        self.store.read().height()
    }

    pub fn coin_count(&self) -> usize {
        self.store.read().coin_count()
    }

    /// Connects `block` on top of the tip.
    pub async fn connect_block(&self, block: Block) -> Result<ChainEntry, NodeError> {
        let _order = self.ordering.lock().await;
        let (event, tip) = {
            let mut store = self.store.write();
            let event = store.connect(block)?;
            (event, store.tip().clone())
        };
        debug!(height = tip.height, hash = %display_hash(&tip.hash), "[lc-02] Block connected");
        self.emit(vec![event]).await;
        Ok(tip)
    }

    /// Removes the tip block.
    pub async fn disconnect_tip(&self) -> Result<ChainEntry, NodeError> {
        let _order = self.ordering.lock().await;
        let (event, tip) = {
            let mut store = self.store.write();
            let event = store.disconnect_tip()?;
            (event, store.tip().clone())
        };
        debug!(height = tip.height, "[lc-02] Tip disconnected");
        self.emit(vec![event]).await;
        Ok(tip)
    }

    /// Switches the main chain to `fork` followed by `blocks`.
    pub async fn reorganize(&self, fork: Hash, blocks: Vec<Block>) -> Result<ChainEntry, NodeError> {
        let _order = self.ordering.lock().await;
        let (events, tip) = {
            let mut store = self.store.write();
            let events = store.reorganize(fork, blocks)?;
            (events, store.tip().clone())
        };
        info!(
            height = tip.height,
            fork = %display_hash(&fork),
            events = events.len(),
            "[lc-02] Chain reorganized"
        );
        self.emit(events).await;
        Ok(tip)
    }

    /// Rewinds the main chain to `height`.
    pub async fn reset(&self, height: u32) -> Result<ChainEntry, NodeError> {
        let _order = self.ordering.lock().await;
        let (event, tip) = {
            let mut store = self.store.write();
            let event = store.reset(height)?;
            (event, store.tip().clone())
        };
        info!(height = tip.height, "[lc-02] Chain reset");
        self.emit(vec![event]).await;
        Ok(tip)
    }

    /// Signals an internal chain failure to the sink.
    pub async fn report_error(&self, message: impl Into<String>) {
        let _order = self.ordering.lock().await;
        self.emit(vec![ChainEvent::Error {
            message: message.into(),
        }])
        .await;
    }

    async fn emit(&self, events: Vec<ChainEvent>) {
        let sink = self.sink.read().clone();
        let Some(sink) = sink else {
            debug!(events = events.len(), "[lc-02] No sink attached, events dropped");
            return;
        };
        for event in events {
            sink.deliver(event).await;
        }
    }
}

#[async_trait]
impl ChainPort for ChainAdapter {
    fn tip(&self) -> ChainEntry {
        self.store.read().tip().clone()
    }

    async fn get_entry_by_height(&self, height: u32) -> Result<Option<ChainEntry>, NodeError> {
        Ok(self.store.read().get_entry_by_height(height).cloned())
    }

    async fn get_block(&self, hash: &Hash) -> Result<Option<Block>, NodeError> {
        Ok(self.store.read().get_block(hash).cloned())
    }

    async fn get_block_view(&self, hash: &Hash) -> Result<Option<CoinView>, NodeError> {
        Ok(self.store.read().get_undo(hash).cloned())
    }

    async fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, NodeError> {
        Ok(self.store.read().get_coin(outpoint).cloned())
    }

    fn attach(&self, sink: Arc<dyn ChainEventSink>) {
        *self.sink.write() = Some(sink);
    }

    fn detach(&self) {
        self.sink.write().take();
    }
}
