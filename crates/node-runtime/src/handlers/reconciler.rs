//! # Reconciler
//!
//! Keeps the pool and the indexes consistent with the chain. Chain events
//! arrive through a bounded mailbox and are handled one at a time, each to
//! completion, in the order the chain applied them.
//!
//! ## Per-event actions
//!
//! | Event        | Action                                                   |
//! |--------------|----------------------------------------------------------|
//! | connect      | index the block, drop confirmed and conflicting pool txs |
//! | disconnect   | reinstate the block's txs in the pool, unindex the block |
//! | reorganize   | evict pool txs whose confirmed inputs vanished           |
//! | reset        | clear the pool, roll indexes back to the tip             |
//! | error        | forward to the error channel                             |
//!
//! A failing handler is logged, counted and published on the error channel.
//! It is never retried and never reaches the chain.
//!
//! The task first catches the indexes up to the chain, then starts reading
//! the mailbox. Events queued meanwhile may describe blocks the catch-up
//! already replayed; an index only sees connects above and disconnects at
//! its synced height.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use shared_bus::{ChainEvent, EventPublisher, EventSource, InMemoryEventBus, NodeEvent};
use shared_types::{display_hash, Block, ChainEntry, CoinView};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::container::Collaborators;
use crate::error::NodeError;
use crate::metrics::{EventKind, ReconcilerMetrics};
use crate::ports::{
    AddrIndexPort, ChainEventSink, ChainPort, IndexSync, MempoolPort, TokenIndexPort, TxIndexPort,
};
use crate::reporting::ErrorReporter;

/// Mailbox messages.
#[derive(Debug)]
pub enum ReconcilerMessage {
    Chain(ChainEvent),
    RollbackTokenIndex {
        height: u32,
        reply: oneshot::Sender<Result<(), NodeError>>,
    },
    /// Answered once every earlier message has been handled.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// A spawned reconciler task.
pub struct StartedReconciler {
    pub handle: ReconcilerHandle,
    pub task: JoinHandle<()>,
    /// Outcome of the index catch-up that runs before the mailbox loop.
    pub synced: oneshot::Receiver<Result<(), NodeError>>,
}

/// Sending half of the reconciler mailbox.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    sender: mpsc::Sender<ReconcilerMessage>,
}

impl ReconcilerHandle {
    pub async fn submit(&self, event: ChainEvent) -> Result<(), NodeError> {
        self.sender
            .send(ReconcilerMessage::Chain(event))
            .await
            .map_err(|_| NodeError::ReconcilerStopped)
    }

    /// Waits until everything submitted before this call has been handled.
    pub async fn flush(&self) -> Result<(), NodeError> {
        let (reply, done) = oneshot::channel();
        self.sender
            .send(ReconcilerMessage::Flush(reply))
            .await
            .map_err(|_| NodeError::ReconcilerStopped)?;
        done.await.map_err(|_| NodeError::ReconcilerStopped)
    }

    pub async fn rollback_token_index(&self, height: u32) -> Result<(), NodeError> {
        let (reply, done) = oneshot::channel();
        self.sender
            .send(ReconcilerMessage::RollbackTokenIndex { height, reply })
            .await
            .map_err(|_| NodeError::ReconcilerStopped)?;
        done.await.map_err(|_| NodeError::ReconcilerStopped)?
    }

    /// Asks the reconciler to stop after draining what is queued.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.sender
            .send(ReconcilerMessage::Shutdown)
            .await
            .map_err(|_| NodeError::ReconcilerStopped)
    }
}

#[async_trait]
impl ChainEventSink for ReconcilerHandle {
    async fn deliver(&self, event: ChainEvent) {
        let kind = event.kind();
        if self.submit(event).await.is_err() {
            warn!(kind, "[reconciler] Mailbox closed, chain event dropped");
        }
    }
}

pub struct Reconciler {
    chain: Arc<dyn ChainPort>,
    mempool: Arc<dyn MempoolPort>,
    tx_index: Option<Arc<dyn TxIndexPort>>,
    addr_index: Option<Arc<dyn AddrIndexPort>>,
    token_index: Option<Arc<dyn TokenIndexPort>>,
    bus: Arc<InMemoryEventBus>,
    reporter: ErrorReporter,
    metrics: Arc<ReconcilerMetrics>,
}

impl Reconciler {
    pub fn new(
        collaborators: &Collaborators,
        bus: Arc<InMemoryEventBus>,
        reporter: ErrorReporter,
        metrics: Arc<ReconcilerMetrics>,
    ) -> Self {
        Self {
            chain: collaborators.chain.clone(),
            mempool: collaborators.mempool.clone(),
            tx_index: collaborators.tx_index.clone(),
            addr_index: collaborators.addr_index.clone(),
            token_index: collaborators.token_index.clone(),
            bus,
            reporter,
            metrics,
        }
    }

    /// Starts the task on the current runtime. It catches the indexes up,
    /// reports the outcome on `synced`, then serves the mailbox.
    pub fn spawn(self, capacity: usize) -> StartedReconciler {
        let (sender, receiver) = mpsc::channel(capacity);
        let (synced_tx, synced) = oneshot::channel();
        let task = tokio::spawn(self.run(receiver, synced_tx));
        StartedReconciler {
            handle: ReconcilerHandle { sender },
            task,
            synced,
        }
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<ReconcilerMessage>,
        synced: oneshot::Sender<Result<(), NodeError>>,
    ) {
        info!("[reconciler] Started");
        let _ = synced.send(self.sync_indexes().await);
        while let Some(message) = receiver.recv().await {
            match message {
                ReconcilerMessage::Chain(event) => self.handle_event(event).await,
                ReconcilerMessage::RollbackTokenIndex { height, reply } => {
                    let result = self.rollback_token_index(height).await;
                    if let Err(err) = &result {
                        self.reporter
                            .report(EventSource::Reconciler, "rollback_token_index", err)
                            .await;
                    }
                    // The caller may have stopped waiting.
                    let _ = reply.send(result);
                }
                ReconcilerMessage::Flush(reply) => {
                    let _ = reply.send(());
                }
                ReconcilerMessage::Shutdown => break,
            }
        }
        info!("[reconciler] Stopped");
    }

    /// Handles one chain event to completion. Never fails.
    pub async fn handle_event(&self, event: ChainEvent) {
        let kind = EventKind::from(&event);
        let name = event.kind();
        let started = Instant::now();

        let result = match event {
            ChainEvent::Connect { entry, block, view } => {
                self.on_connect(&entry, &block, &view).await
            }
            ChainEvent::Disconnect { entry, block, view } => {
                self.on_disconnect(&entry, &block, &view).await
            }
            ChainEvent::Reorganize { new_tip, old_tip } => {
                self.on_reorganize(new_tip, old_tip).await
            }
            ChainEvent::Reset { tip } => self.on_reset(tip).await,
            ChainEvent::Error { message } => {
                self.reporter
                    .report(EventSource::Chain, "chain", &message)
                    .await;
                Ok(())
            }
        };

        self.metrics.record_event(kind, started.elapsed());
        if let Err(err) = result {
            error!(event = name, error = %err, "[reconciler] Handler failed");
            self.metrics.record_failure(kind);
            self.reporter
                .report(EventSource::Reconciler, name, &err)
                .await;
        }
    }

    async fn on_connect(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), NodeError> {
        // A failing index must not keep confirmed txs in the pool.
        let indexed = self.index_block(entry, block, view).await;
        let removal = self.mempool.add_block(entry, &block.txs).await?;
        self.metrics.record_evictions(removal.total());

        debug!(
            height = entry.height,
            hash = %display_hash(&entry.hash),
            confirmed = removal.confirmed.len(),
            conflicts = removal.conflicts.len(),
            "[reconciler] Block connected"
        );
        self.bus
            .publish(NodeEvent::BlockConnected {
                entry: entry.clone(),
                tx_count: block.txs.len(),
            })
            .await;
        indexed
    }

    async fn on_disconnect(
        &self,
        entry: &ChainEntry,
        block: &Block,
        _view: &CoinView,
    ) -> Result<(), NodeError> {
        let reinstatement = self.mempool.remove_block(entry, &block.txs).await?;
        self.metrics
            .record_reinstated(reinstatement.reinstated.len(), reinstatement.failed.len());
        if !reinstatement.failed.is_empty() {
            warn!(
                height = entry.height,
                failed = reinstatement.failed.len(),
                "[reconciler] Some transactions could not be reinstated"
            );
        }

        for index in self.indexes() {
            if index.synced_height().map_or(true, |h| h < entry.height) {
                debug!(index = index.name(), height = entry.height, "[reconciler] Already unindexed");
                continue;
            }
            index.unindex_block(entry).await?;
        }

        debug!(
            height = entry.height,
            reinstated = reinstatement.reinstated.len(),
            "[reconciler] Block disconnected"
        );
        self.bus
            .publish(NodeEvent::BlockDisconnected {
                entry: entry.clone(),
            })
            .await;
        Ok(())
    }

    async fn on_reorganize(&self, new_tip: ChainEntry, old_tip: ChainEntry) -> Result<(), NodeError> {
        let evicted = self.mempool.handle_reorg(&new_tip).await?;
        self.metrics.record_evictions(evicted.len());
        info!(
            new_height = new_tip.height,
            old_height = old_tip.height,
            evicted = evicted.len(),
            "[reconciler] Reorganization reconciled"
        );
        self.bus
            .publish(NodeEvent::Reorganized {
                new_tip,
                old_tip,
                evicted,
            })
            .await;
        Ok(())
    }

    async fn on_reset(&self, tip: ChainEntry) -> Result<(), NodeError> {
        let dropped = self.mempool.hashes().len();
        self.mempool.reset(&tip).await?;
        self.metrics.record_evictions(dropped);
        for index in self.indexes() {
            index.rollback(tip.height).await?;
        }
        info!(height = tip.height, dropped, "[reconciler] Reset reconciled");
        self.bus.publish(NodeEvent::Reset { tip }).await;
        Ok(())
    }

    /// Marks the token index syncing, rolls it back to `height`, clears the
    /// flag and replays the main chain above `height` into it.
    pub async fn rollback_token_index(&self, height: u32) -> Result<(), NodeError> {
        let index = self
            .token_index
            .as_ref()
            .ok_or(NodeError::Disabled("token index"))?;

        info!(height, "[reconciler] Rolling back token index");
        index.set_syncing(true);
        let rolled = index.rollback(height).await;
        index.set_syncing(false);
        rolled?;

        let replayed = self.catch_up(index.as_ref()).await?;
        info!(height, replayed, "[reconciler] Token index resynchronized");
        Ok(())
    }

    /// Brings every enabled index up to the chain tip. Runs at task start.
    pub async fn sync_indexes(&self) -> Result<(), NodeError> {
        for index in self.indexes() {
            let replayed = self.catch_up(index).await?;
            if replayed > 0 {
                info!(index = index.name(), replayed, "[reconciler] Index caught up");
            }
        }
        Ok(())
    }

    /// Replays main-chain blocks above the index's synced height.
    async fn catch_up<I: IndexSync + ?Sized>(&self, index: &I) -> Result<u32, NodeError> {
        let start = index.synced_height().map_or(0, |h| h + 1);
        let tip = self.chain.tip().height;
        let mut replayed = 0;

        for height in start..=tip {
            let Some(entry) = self.chain.get_entry_by_height(height).await? else {
                break;
            };
            let block = self.chain.get_block(&entry.hash).await?.ok_or_else(|| {
                NodeError::InvariantViolation(format!(
                    "main-chain block {} at height {height} has no body",
                    display_hash(&entry.hash)
                ))
            })?;
            let view = self
                .chain
                .get_block_view(&entry.hash)
                .await?
                .unwrap_or_default();
            index.index_block(&entry, &block, &view).await?;
            replayed += 1;
        }
        Ok(replayed)
    }

    async fn index_block(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), NodeError> {
        for index in self.indexes() {
            if index.synced_height().is_some_and(|h| h >= entry.height) {
                debug!(index = index.name(), height = entry.height, "[reconciler] Already indexed");
                continue;
            }
            index.index_block(entry, block, view).await?;
        }
        Ok(())
    }

    fn indexes(&self) -> Vec<&dyn IndexSync> {
        let mut indexes: Vec<&dyn IndexSync> = Vec::with_capacity(3);
        if let Some(index) = &self.tx_index {
            indexes.push(index.as_sync());
        }
        if let Some(index) = &self.addr_index {
            indexes.push(index.as_sync());
        }
        if let Some(index) = &self.token_index {
            indexes.push(index.as_sync());
        }
        indexes
    }
}
