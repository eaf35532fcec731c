//! # Node
//!
//! The public face of the node core. Owns the reconciler task, the pool
//! admission forwarder and the query and submission services, and exposes
//! every operation a wallet, RPC layer or indexer needs.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──→ open ──→ (chain events reconciled, queries served) ──→ close
//! ```
//!
//! `open` attaches the reconciler to the chain before anything else, so no
//! chain event is missed. The reconciler catches the indexes up before it
//! handles the first queued event, and `open` returns once that catch-up is
//! done.

use std::sync::Arc;

use parking_lot::Mutex;
use shared_bus::InMemoryEventBus;
use shared_types::{
    Address, AnnotatedTx, Block, ChainEntry, Coin, CoinView, Hash, InventoryItem, Transaction,
    TxMeta,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::container::{Collaborators, ConfigError, NodeConfig, SubsystemContainer};
use crate::error::NodeError;
use crate::handlers::{Reconciler, ReconcilerHandle, TxForwarder};
use crate::metrics::{MetricsSnapshot, ReconcilerMetrics};
use crate::reporting::ErrorReporter;
use crate::services::{
    self, HistoryOptions, QueryService, ScanFilter, SubmissionService, Submitted, TokenOverlay,
};

struct RunningTasks {
    handle: ReconcilerHandle,
    reconciler: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

pub struct Node {
    config: NodeConfig,
    collaborators: Collaborators,
    bus: Arc<InMemoryEventBus>,
    metrics: Arc<ReconcilerMetrics>,
    reporter: ErrorReporter,
    query: QueryService,
    submission: SubmissionService,
    tasks: Mutex<Option<RunningTasks>>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        collaborators: Collaborators,
        bus: Arc<InMemoryEventBus>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        if collaborators.token_index.is_some() && collaborators.tx_index.is_none() {
            return Err(ConfigError::TokenIndexRequiresTxIndex.into());
        }

        let metrics = Arc::new(ReconcilerMetrics::new());
        let reporter = ErrorReporter::new(bus.clone(), metrics.clone());
        let tokens = TokenOverlay::new(
            collaborators.mempool.clone(),
            collaborators.token_index.clone(),
        );
        let query = QueryService::new(
            collaborators.chain.clone(),
            collaborators.mempool.clone(),
            collaborators.tx_index.clone(),
            collaborators.addr_index.clone(),
            tokens,
        );
        let submission = SubmissionService::new(
            collaborators.mempool.clone(),
            collaborators.relay.clone(),
            reporter.clone(),
            config.relay.selfish,
        );

        Ok(Self {
            config,
            collaborators,
            bus,
            metrics,
            reporter,
            query,
            submission,
            tasks: Mutex::new(None),
        })
    }

    pub fn from_container(config: NodeConfig, container: &SubsystemContainer) -> Result<Self, NodeError> {
        Self::new(config, container.collaborators.clone(), container.bus.clone())
    }

    /// Starts the reconciler, subscribes it to the chain and waits for the
    /// indexes to catch up. Opening an open node does nothing.
    pub async fn open(&self) -> Result<(), NodeError> {
        if self.tasks.lock().is_some() {
            warn!("[node] Already open");
            return Ok(());
        }

        let reconciler = Reconciler::new(
            &self.collaborators,
            self.bus.clone(),
            self.reporter.clone(),
            self.metrics.clone(),
        );
        let started = reconciler.spawn(self.config.reconciler.queue_capacity);
        let (handle, reconciler) = (started.handle, started.task);
        self.collaborators.chain.attach(Arc::new(handle.clone()));

        let synced = started
            .synced
            .await
            .unwrap_or(Err(NodeError::ReconcilerStopped));
        if let Err(err) = synced {
            self.collaborators.chain.detach();
            if handle.shutdown().await.is_err() {
                warn!("[node] Reconciler already stopped");
            }
            reconciler.abort();
            return Err(err);
        }

        let forwarder = TxForwarder::new(
            self.collaborators.mempool.subscribe_txs(),
            self.bus.clone(),
            self.collaborators.miner.clone(),
        )
        .spawn();

        *self.tasks.lock() = Some(RunningTasks {
            handle,
            reconciler,
            forwarder,
        });
        info!(
            height = self.collaborators.chain.tip().height,
            selfish = self.config.relay.selfish,
            "[node] Opened"
        );
        Ok(())
    }

    /// Detaches from the chain, drains the reconciler and stops it.
    pub async fn close(&self) -> Result<(), NodeError> {
        let tasks = self.tasks.lock().take();
        let Some(tasks) = tasks else {
            return Ok(());
        };

        self.collaborators.chain.detach();
        tasks.forwarder.abort();
        if tasks.handle.shutdown().await.is_err() {
            warn!("[node] Reconciler already stopped");
        }
        if let Err(err) = tasks.reconciler.await {
            warn!(error = %err, "[node] Reconciler task ended abnormally");
        }
        info!("[node] Closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Mailbox of the running reconciler.
    pub fn handle(&self) -> Option<ReconcilerHandle> {
        self.tasks.lock().as_ref().map(|tasks| tasks.handle.clone())
    }

    /// Waits until every chain event delivered so far has been reconciled.
    pub async fn flush(&self) -> Result<(), NodeError> {
        self.running()?.flush().await
    }

    pub fn tip(&self) -> ChainEntry {
        self.collaborators.chain.tip()
    }

    pub async fn get_block(&self, hash: &Hash) -> Result<Option<Block>, NodeError> {
        self.query.get_block(hash).await
    }

    pub async fn get_coin(
        &self,
        hash: &Hash,
        index: u32,
        include_token: bool,
    ) -> Result<Option<Coin>, NodeError> {
        self.query.get_coin(hash, index, include_token).await
    }

    pub async fn get_coins_by_address(
        &self,
        address: &Address,
        include_token: bool,
    ) -> Result<Vec<Coin>, NodeError> {
        self.query.get_coins_by_address(address, include_token).await
    }

    pub async fn get_meta(&self, hash: &Hash, include_token: bool) -> Result<Option<TxMeta>, NodeError> {
        self.query.get_meta(hash, include_token).await
    }

    pub async fn get_meta_view(&self, meta: &TxMeta) -> Result<Option<CoinView>, NodeError> {
        self.query.get_meta_view(meta).await
    }

    pub async fn get_meta_by_address(
        &self,
        address: &Address,
        options: &HistoryOptions,
    ) -> Result<Vec<TxMeta>, NodeError> {
        self.query.get_meta_by_address(address, options).await
    }

    pub async fn get_tx(&self, hash: &Hash, include_token: bool) -> Result<Option<AnnotatedTx>, NodeError> {
        self.query.get_tx(hash, include_token).await
    }

    pub async fn get_tx_by_address(
        &self,
        address: &Address,
        options: &HistoryOptions,
    ) -> Result<Vec<AnnotatedTx>, NodeError> {
        self.query.get_tx_by_address(address, options).await
    }

    pub async fn has_tx(&self, hash: &Hash) -> Result<bool, NodeError> {
        self.query.has_tx(hash).await
    }

    pub async fn send_tx(&self, tx: Transaction, relay_unverified: bool) -> Result<Submitted, NodeError> {
        self.submission.send_tx(tx, relay_unverified).await
    }

    /// Submits `tx` allowing unverified relay. Never fails.
    pub async fn relay(&self, tx: Transaction) {
        self.submission.relay(tx).await
    }

    pub async fn broadcast(&self, item: InventoryItem) -> Result<(), NodeError> {
        self.submission.broadcast(item).await
    }

    /// Rescans the main chain from `start`. Returns the number of blocks
    /// visited.
    pub async fn scan<F>(&self, start: u32, filter: &mut ScanFilter, iter: F) -> Result<u32, NodeError>
    where
        F: FnMut(&ChainEntry, Vec<Transaction>) -> Result<(), NodeError>,
    {
        services::scan(self.collaborators.chain.as_ref(), start, filter, iter).await
    }

    pub async fn connect(&self) -> Result<(), NodeError> {
        self.collaborators.relay.connect().await
    }

    pub async fn disconnect(&self) -> Result<(), NodeError> {
        self.collaborators.relay.disconnect().await
    }

    pub async fn start_sync(&self) -> Result<(), NodeError> {
        self.collaborators.relay.start_sync().await
    }

    pub async fn stop_sync(&self) -> Result<(), NodeError> {
        self.collaborators.relay.stop_sync().await
    }

    /// Rolls the token index back to `height` and resynchronizes it. Runs
    /// between chain events, never during one.
    pub async fn rollback_token_index(&self, height: u32) -> Result<(), NodeError> {
        if self.collaborators.token_index.is_none() {
            return Err(NodeError::Disabled("token index"));
        }
        self.running()?.rollback_token_index(height).await
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn running(&self) -> Result<ReconcilerHandle, NodeError> {
        self.handle().ok_or(NodeError::ReconcilerStopped)
    }
}
