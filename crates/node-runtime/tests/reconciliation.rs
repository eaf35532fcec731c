//! Chain events reconciled into the pool and the indexes.

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Harness, MINER};
use lc_03_indexing::TxIndex;
use node_runtime::adapters::TxIndexAdapter;
use node_runtime::ports::{ChainPort, IndexSync, MempoolPort, TxIndexPort};
use node_runtime::{Node, NodeConfig, NodeError, SubsystemContainer};
use shared_bus::{EventFilter, EventSource, EventTopic, NodeEvent};
use shared_types::test_utils::{address, genesis_block, next_block, pay, COINBASE_VALUE, FIXTURE_FEE};
use shared_types::{Block, ChainEntry, CoinView, Hash, OutPoint, Transaction, TxMeta};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

fn coinbase_of(block: &Block) -> OutPoint {
    OutPoint::new(block.txs[0].hash(), 0)
}

fn sorted(mut hashes: Vec<Hash>) -> Vec<Hash> {
    hashes.sort();
    hashes
}

#[tokio::test]
async fn test_connect_drops_confirmed_and_double_spent_txs() {
    let h = Harness::full().await;
    let (_, b1) = h.mine(vec![]).await;

    let pending = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));
    let kept = pay(coinbase_of(&b1), COINBASE_VALUE, &address(3));
    h.node.send_tx(pending.clone(), false).await.unwrap();
    h.node.send_tx(kept.clone(), false).await.unwrap();

    // Spends the same genesis coin as `pending`.
    let rival = pay(h.genesis_coin(), COINBASE_VALUE, &address(4));
    h.mine(vec![rival.clone()]).await;

    assert_eq!(h.mempool.hashes(), vec![kept.hash()]);
    assert!(!h.node.has_tx(&pending.hash()).await.unwrap());
    let meta = h.node.get_meta(&rival.hash(), false).await.unwrap().unwrap();
    assert_eq!(meta.height, 2);
    assert_eq!(h.node.metrics().connects, 2);
    assert_eq!(h.node.metrics().pool_evictions, 1);
}

#[tokio::test]
async fn test_disconnect_then_reconnect_restores_pool() {
    let h = Harness::full().await;
    let (_, b1) = h.mine(vec![]).await;
    let pending = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));
    h.node.send_tx(pending.clone(), false).await.unwrap();

    let confirmed = pay(coinbase_of(&b1), COINBASE_VALUE, &address(3));
    let (_, b2) = h.mine(vec![confirmed.clone()]).await;
    let before = sorted(h.mempool.hashes());

    h.chain.disconnect_tip().await.unwrap();
    h.node.flush().await.unwrap();
    assert_eq!(
        sorted(h.mempool.hashes()),
        sorted(vec![pending.hash(), confirmed.hash()])
    );
    let meta = h.node.get_meta(&confirmed.hash(), false).await.unwrap().unwrap();
    assert_eq!(meta.height, -1);

    h.chain.connect_block(b2).await.unwrap();
    h.node.flush().await.unwrap();
    assert_eq!(sorted(h.mempool.hashes()), before);
    assert!(h.node.get_meta(&confirmed.hash(), false).await.unwrap().unwrap().is_confirmed());
}

#[tokio::test]
async fn test_reconnecting_a_conflicting_block_evicts_the_double_spend() {
    let h = Harness::full().await;
    let (tip, _) = h.mine(vec![]).await;
    let pending = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));
    h.node.send_tx(pending.clone(), false).await.unwrap();

    h.chain.disconnect_tip().await.unwrap();
    h.node.flush().await.unwrap();
    assert!(h.mempool.has_tx(&pending.hash()));

    let genesis_entry = h.entry_at(0).await;
    let rival = pay(h.genesis_coin(), COINBASE_VALUE, &address(4));
    h.chain
        .connect_block(h.sibling(&genesis_entry, vec![rival]))
        .await
        .unwrap();
    h.node.flush().await.unwrap();
    assert_ne!(h.chain.tip().hash, tip.hash);
    assert!(h.mempool.hashes().is_empty());
}

#[tokio::test]
async fn test_reorganize_evicts_spends_of_vanished_coins() {
    let h = Harness::full().await;
    let mut chain_events = h.node.bus().subscribe(EventFilter::topics(vec![EventTopic::Chain]));
    let (old_tip, b1) = h.mine(vec![]).await;
    let orphaned = pay(coinbase_of(&b1), COINBASE_VALUE, &address(2));
    let survivor = pay(h.genesis_coin(), COINBASE_VALUE, &address(3));
    h.node.send_tx(orphaned.clone(), false).await.unwrap();
    h.node.send_tx(survivor.clone(), false).await.unwrap();

    let genesis_entry = h.entry_at(0).await;
    let fork_b1 = h.sibling(&genesis_entry, vec![]);
    let fork_entry = ChainEntry::from_block(&fork_b1, Some(&genesis_entry));
    let fork_b2 = next_block(&fork_entry, &address(MINER), vec![]);
    let new_tip = h
        .chain
        .reorganize(genesis_entry.hash, vec![fork_b1, fork_b2])
        .await
        .unwrap();
    h.node.flush().await.unwrap();

    assert_eq!(h.mempool.hashes(), vec![survivor.hash()]);
    for outpoint in h.mempool.get_spent_view(&survivor).iter().map(|coin| coin.outpoint) {
        assert!(h.chain.get_coin(&outpoint).await.unwrap().is_some());
    }
    assert!(!h.node.has_tx(&b1.txs[0].hash()).await.unwrap());

    let mut reorganized = None;
    while let Ok(Some(event)) = chain_events.try_recv() {
        if let NodeEvent::Reorganized { .. } = event {
            reorganized = Some(event);
        }
    }
    assert_eq!(
        reorganized,
        Some(NodeEvent::Reorganized {
            new_tip,
            old_tip,
            evicted: vec![orphaned.hash()],
        })
    );
    assert_eq!(h.node.metrics().reorganizations, 1);
}

#[tokio::test]
async fn test_reset_clears_pool_and_rolls_indexes_back() {
    let h = Harness::full().await;
    let confirmed = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));
    h.mine(vec![confirmed.clone()]).await;
    let child = pay(
        OutPoint::new(confirmed.hash(), 0),
        COINBASE_VALUE - FIXTURE_FEE,
        &address(3),
    );
    h.node.send_tx(child, false).await.unwrap();

    h.chain.reset(0).await.unwrap();
    h.node.flush().await.unwrap();

    assert!(h.mempool.hashes().is_empty());
    assert!(!h.node.has_tx(&confirmed.hash()).await.unwrap());
    assert!(h
        .node
        .get_coin(&h.genesis_coin().hash, 0, false)
        .await
        .unwrap()
        .is_some());
    assert_eq!(h.node.metrics().resets, 1);
}

#[tokio::test]
async fn test_token_index_rollback_resynchronizes() {
    let h = Harness::full().await;
    let tx = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));
    h.mine(vec![tx.clone()]).await;
    h.mine(vec![]).await;

    h.node.rollback_token_index(0).await.unwrap();
    assert!(h.node.has_tx(&tx.hash()).await.unwrap());
    assert!(h.node.get_tx(&tx.hash(), true).await.unwrap().is_some());

    h.node.close().await.unwrap();
    assert!(matches!(
        h.node.rollback_token_index(0).await,
        Err(NodeError::ReconcilerStopped)
    ));
}

#[tokio::test]
async fn test_chain_errors_reach_the_error_channel() {
    let h = Harness::full().await;
    let mut errors = h.node.bus().subscribe(EventFilter::topics(vec![EventTopic::Errors]));

    h.chain.report_error("block file truncated").await;
    h.node.flush().await.unwrap();

    match timeout(Duration::from_secs(1), errors.recv()).await.unwrap() {
        Some(NodeEvent::Error(report)) => {
            assert_eq!(report.source, EventSource::Chain);
            assert_eq!(report.message, "block file truncated");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.node.metrics().chain_errors, 1);
}

/// Tx index that fails while `failing` is set and parks once inside
/// `index_block` at `park_at`, recording every call it sees.
struct ScriptedTxIndex {
    inner: TxIndexAdapter,
    failing: AtomicBool,
    park_at: AtomicU32,
    parked: Notify,
    release: Notify,
    calls: parking_lot::Mutex<Vec<String>>,
}

impl ScriptedTxIndex {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: TxIndexAdapter::new(TxIndex::new()),
            failing: AtomicBool::new(false),
            park_at: AtomicU32::new(u32::MAX),
            parked: Notify::new(),
            release: Notify::new(),
            calls: parking_lot::Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IndexSync for ScriptedTxIndex {
    fn name(&self) -> &'static str {
        "scripted-tx"
    }

    fn synced_height(&self) -> Option<u32> {
        self.inner.synced_height()
    }

    async fn index_block(&self, entry: &ChainEntry, block: &Block, view: &CoinView) -> Result<(), NodeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NodeError::InvariantViolation("index store offline".into()));
        }
        self.calls.lock().push(format!("index {} start", entry.height));
        if self
            .park_at
            .compare_exchange(entry.height, u32::MAX, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.parked.notify_one();
            self.release.notified().await;
        }
        self.inner.index_block(entry, block, view).await?;
        self.calls.lock().push(format!("index {} done", entry.height));
        Ok(())
    }

    async fn unindex_block(&self, entry: &ChainEntry) -> Result<(), NodeError> {
        self.calls.lock().push(format!("unindex {}", entry.height));
        self.inner.unindex_block(entry).await
    }

    async fn rollback(&self, height: u32) -> Result<(), NodeError> {
        self.inner.rollback(height).await
    }

    fn as_sync(&self) -> &dyn IndexSync {
        self
    }
}

#[async_trait]
impl TxIndexPort for ScriptedTxIndex {
    async fn get_meta(&self, hash: &Hash) -> Result<Option<TxMeta>, NodeError> {
        self.inner.get_meta(hash).await
    }

    async fn has_tx(&self, hash: &Hash) -> Result<bool, NodeError> {
        self.inner.has_tx(hash).await
    }

    async fn get_spent_view(&self, tx: &Transaction) -> Result<Option<CoinView>, NodeError> {
        self.inner.get_spent_view(tx).await
    }
}

/// A node with only a tx index, backed by `index`. Not opened.
fn scripted_node(index: Arc<ScriptedTxIndex>) -> (Node, SubsystemContainer) {
    let mut config = NodeConfig::default();
    config.indexes.tx_index = true;
    config.mempool = lc_01_mempool::MempoolConfig::for_testing();
    let container = SubsystemContainer::in_memory(&config, genesis_block(&address(1))).unwrap();
    let mut collaborators = container.collaborators.clone();
    collaborators.tx_index = Some(index);
    let node = Node::new(config, collaborators, container.bus.clone()).unwrap();
    (node, container)
}

fn genesis_coin() -> OutPoint {
    OutPoint::new(genesis_block(&address(1)).txs[0].hash(), 0)
}

#[tokio::test]
async fn test_failed_handler_is_isolated() {
    let index = ScriptedTxIndex::new();
    let (node, container) = scripted_node(index.clone());
    node.open().await.unwrap();
    let mut errors = node.bus().subscribe(EventFilter::topics(vec![EventTopic::Errors]));
    let mut chain_events = node.bus().subscribe(EventFilter::topics(vec![EventTopic::Chain]));

    let tx = pay(genesis_coin(), COINBASE_VALUE, &address(2));
    node.send_tx(tx.clone(), false).await.unwrap();

    index.failing.store(true, Ordering::SeqCst);
    let block = next_block(&container.chain.tip(), &address(MINER), vec![tx.clone()]);
    let entry = container.chain.connect_block(block).await.unwrap();
    node.flush().await.unwrap();

    match timeout(Duration::from_secs(1), errors.recv()).await.unwrap() {
        Some(NodeEvent::Error(report)) => {
            assert_eq!(report.source, EventSource::Reconciler);
            assert_eq!(report.context, "connect");
        }
        other => panic!("unexpected event {other:?}"),
    }
    // The pool still learned about the block and observers were told.
    assert!(!container.mempool.has_tx(&tx.hash()));
    match timeout(Duration::from_secs(1), chain_events.recv()).await.unwrap() {
        Some(NodeEvent::BlockConnected { entry: connected, .. }) => assert_eq!(connected, entry),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(node.metrics().failures, 1);

    // Later events are still handled.
    container.chain.report_error("still alive").await;
    node.flush().await.unwrap();
    assert_eq!(node.metrics().chain_errors, 1);
    assert_eq!(node.metrics().events_processed, 2);
    node.close().await.unwrap();
}

#[tokio::test]
async fn test_suspended_handler_finishes_before_next_event_starts() {
    let index = ScriptedTxIndex::new();
    let (node, container) = scripted_node(index.clone());
    node.open().await.unwrap();

    index.park_at.store(1, Ordering::SeqCst);
    let block = next_block(&container.chain.tip(), &address(MINER), vec![]);
    container.chain.connect_block(block).await.unwrap();
    index.parked.notified().await;

    // Queued behind the parked connect.
    container.chain.disconnect_tip().await.unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(index.calls(), vec!["index 0 start", "index 0 done", "index 1 start"]);

    index.release.notify_one();
    node.flush().await.unwrap();
    assert_eq!(
        index.calls(),
        vec!["index 0 start", "index 0 done", "index 1 start", "index 1 done", "unindex 1"]
    );
    assert_eq!(node.metrics().failures, 0);
    node.close().await.unwrap();
}

#[tokio::test]
async fn test_block_connected_during_open_is_reconciled() {
    let index = ScriptedTxIndex::new();
    let (node, container) = scripted_node(index.clone());
    let b1 = next_block(&container.chain.tip(), &address(MINER), vec![]);
    container.chain.connect_block(b1).await.unwrap();
    let tx = pay(genesis_coin(), COINBASE_VALUE, &address(2));
    container.mempool.add_tx(tx.clone()).await.unwrap();

    // Catch-up parks on block 1 while block 2 confirms the pooled tx.
    index.park_at.store(1, Ordering::SeqCst);
    let chain = container.chain.clone();
    let (opened, _) = tokio::join!(node.open(), async {
        index.parked.notified().await;
        let b2 = next_block(&chain.tip(), &address(MINER), vec![tx.clone()]);
        chain.connect_block(b2).await.unwrap();
        index.release.notify_one();
    });
    opened.unwrap();
    node.flush().await.unwrap();

    assert_eq!(index.synced_height(), Some(2));
    assert!(!container.mempool.has_tx(&tx.hash()));
    assert!(node.has_tx(&tx.hash()).await.unwrap());
    assert_eq!(node.metrics().failures, 0);
    node.close().await.unwrap();
}
