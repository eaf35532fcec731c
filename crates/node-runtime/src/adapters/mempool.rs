//! # Mempool Adapter
//!
//! Runs the [`TransactionPool`] against the chain: inputs the pool cannot
//! resolve are looked up as confirmed coins before admission.
//!
//! Admission and every block-driven update hold the same async lock, so a
//! block cannot be applied between an input lookup and the admission that
//! relies on it.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lc_01_mempool::{BlockRemoval, MempoolConfig, MempoolStatus, TimeSource, TransactionPool};
use parking_lot::RwLock;
use shared_types::{
    display_hash, Address, AddressQuery, ChainEntry, Coin, CoinTokenRecord, CoinView, Hash,
    OutPoint, TokenRecord, Transaction, TxMeta,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::NodeError;
use crate::ports::{AddOutcome, ChainPort, MempoolPort, Reinstatement};

const TX_CHANNEL_CAPACITY: usize = 1024;

pub struct MempoolAdapter {
    pool: RwLock<TransactionPool>,
    /// Serializes admission with block connect, disconnect, reorg and reset.
    update: Mutex<()>,
    chain: Arc<dyn ChainPort>,
    time: Arc<dyn TimeSource>,
    accepted: broadcast::Sender<Transaction>,
}

impl MempoolAdapter {
    pub fn new(config: MempoolConfig, chain: Arc<dyn ChainPort>, time: Arc<dyn TimeSource>) -> Self {
        let mut pool = TransactionPool::new(config);
        pool.set_tip_height(chain.tip().height);
        let (accepted, _) = broadcast::channel(TX_CHANNEL_CAPACITY);
        Self {
            pool: RwLock::new(pool),
            update: Mutex::new(()),
            chain,
            time,
            accepted,
        }
    }

    pub fn status(&self) -> MempoolStatus {
        self.pool.read().status()
    }

    /// Confirmed coins for inputs the pool could not resolve.
    async fn resolve_confirmed(
        &self,
        unresolved: &[OutPoint],
        view: &mut CoinView,
    ) -> Result<Vec<OutPoint>, NodeError> {
        let mut missing = Vec::new();
        for outpoint in unresolved {
            match self.chain.get_coin(outpoint).await? {
                Some(coin) => view.add(coin),
                None => missing.push(*outpoint),
            }
        }
        Ok(missing)
    }

    /// Admits `tx`. Callers hold `update`.
    async fn admit(&self, tx: Transaction) -> Result<AddOutcome, NodeError> {
        let hash = tx.hash();
        let resolution = {
            let pool = self.pool.read();
            pool.precheck(&tx, &hash)?;
            pool.resolve_inputs(&tx)
        };

        let mut view = resolution.view;
        let missing = self.resolve_confirmed(&resolution.unresolved, &mut view).await?;
        if !missing.is_empty() {
            let mut parents: Vec<Hash> = missing.iter().map(|op| op.hash).collect();
            parents.sort();
            parents.dedup();
            debug!(
                tx = %display_hash(&hash),
                missing = parents.len(),
                "[lc-01] Orphan transaction not stored"
            );
            return Ok(AddOutcome::Orphan { missing: parents });
        }

        let now = self.time.now();
        self.pool.write().add(tx.clone(), view, now)?;
        debug!(tx = %display_hash(&hash), "[lc-01] Transaction accepted");
        // No receivers is fine.
        let _ = self.accepted.send(tx);
        Ok(AddOutcome::Accepted(hash))
    }
}

#[async_trait]
impl MempoolPort for MempoolAdapter {
    async fn add_tx(&self, tx: Transaction) -> Result<AddOutcome, NodeError> {
        let _update = self.update.lock().await;
        self.admit(tx).await
    }

    fn has_tx(&self, hash: &Hash) -> bool {
        self.pool.read().contains(hash)
    }

    fn hashes(&self) -> Vec<Hash> {
        self.pool.read().hashes()
    }

    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.pool.read().get_coin(outpoint)
    }

    fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.pool.read().is_spent(outpoint)
    }

    fn get_coins_by_address(&self, address: &Address) -> Vec<Coin> {
        self.pool.read().get_coins_by_address(address)
    }

    fn get_meta(&self, hash: &Hash) -> Option<TxMeta> {
        self.pool.read().get_meta(hash)
    }

    fn get_metas_by_address(&self, address: &Address, query: &AddressQuery) -> Vec<TxMeta> {
        self.pool.read().get_metas_by_address(address, query)
    }

    fn get_spent_view(&self, tx: &Transaction) -> CoinView {
        self.pool.read().get_spent_view(tx)
    }

    fn get_tx_token_records(&self, hash: &Hash) -> Vec<CoinTokenRecord> {
        self.pool.read().get_tx_token_records(hash)
    }

    fn get_coin_token_record(&self, outpoint: &OutPoint) -> Option<CoinTokenRecord> {
        self.pool.read().get_coin_token_record(outpoint)
    }

    fn get_token_record(&self, key: &Hash) -> Option<TokenRecord> {
        self.pool.read().get_token_record(key)
    }

    fn subscribe_txs(&self) -> broadcast::Receiver<Transaction> {
        self.accepted.subscribe()
    }

    async fn add_block(
        &self,
        entry: &ChainEntry,
        txs: &[Transaction],
    ) -> Result<BlockRemoval, NodeError> {
        let _update = self.update.lock().await;
        let removal = self.pool.write().remove_block(txs, entry.height);
        if !removal.conflicts.is_empty() {
            info!(
                height = entry.height,
                conflicts = removal.conflicts.len(),
                "[lc-01] Removed double-spent transactions"
            );
        }
        Ok(removal)
    }

    async fn remove_block(
        &self,
        entry: &ChainEntry,
        txs: &[Transaction],
    ) -> Result<Reinstatement, NodeError> {
        let _update = self.update.lock().await;
        self.pool
            .write()
            .set_tip_height(entry.height.saturating_sub(1));

        let mut result = Reinstatement::default();
        for tx in txs.iter().filter(|tx| !tx.is_coinbase()) {
            let hash = tx.hash();
            match self.admit(tx.clone()).await {
                Ok(AddOutcome::Accepted(_)) => result.reinstated.push(hash),
                Ok(AddOutcome::Orphan { .. }) => {
                    warn!(tx = %display_hash(&hash), "[lc-01] Reinstated transaction is an orphan");
                    result.failed.push(hash);
                }
                Err(err) => {
                    warn!(tx = %display_hash(&hash), error = %err, "[lc-01] Failed to reinstate transaction");
                    result.failed.push(hash);
                }
            }
        }
        Ok(result)
    }

    async fn handle_reorg(&self, tip: &ChainEntry) -> Result<Vec<Hash>, NodeError> {
        let _update = self.update.lock().await;
        let candidates = self.pool.read().confirmed_inputs();
        let mut missing = HashSet::new();
        for outpoint in candidates {
            if self.chain.get_coin(&outpoint).await?.is_none() {
                missing.insert(outpoint);
            }
        }

        let mut pool = self.pool.write();
        pool.set_tip_height(tip.height);
        if missing.is_empty() {
            return Ok(Vec::new());
        }
        let evicted = pool.evict_spending(&missing);
        info!(
            height = tip.height,
            evicted = evicted.len(),
            "[lc-01] Evicted transactions after reorganization"
        );
        Ok(evicted)
    }

    async fn reset(&self, tip: &ChainEntry) -> Result<(), NodeError> {
        let _update = self.update.lock().await;
        let dropped = {
            let mut pool = self.pool.write();
            let dropped = pool.len();
            pool.reset(tip.height);
            dropped
        };
        info!(height = tip.height, dropped, "[lc-01] Pool reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChainAdapter;
    use crate::ports::ChainEventSink;
    use lc_01_mempool::FixedTimeSource;
    use shared_types::test_utils::{address, genesis_block, next_block, pay, COINBASE_VALUE};
    use shared_types::Block;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Chain whose next coin lookup parks after reading until released.
    struct ParkedLookupChain {
        inner: Arc<ChainAdapter>,
        armed: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ChainPort for ParkedLookupChain {
        fn tip(&self) -> ChainEntry {
            self.inner.tip()
        }

        async fn get_entry_by_height(&self, height: u32) -> Result<Option<ChainEntry>, NodeError> {
            self.inner.get_entry_by_height(height).await
        }

        async fn get_block(&self, hash: &Hash) -> Result<Option<Block>, NodeError> {
            self.inner.get_block(hash).await
        }

        async fn get_block_view(&self, hash: &Hash) -> Result<Option<CoinView>, NodeError> {
            self.inner.get_block_view(hash).await
        }

        async fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, NodeError> {
            let coin = self.inner.get_coin(outpoint).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            Ok(coin)
        }

        fn attach(&self, sink: Arc<dyn ChainEventSink>) {
            self.inner.attach(sink)
        }

        fn detach(&self) {
            self.inner.detach()
        }
    }

    fn setup() -> (Arc<ChainAdapter>, MempoolAdapter, OutPoint) {
        let genesis = genesis_block(&address(1));
        let coinbase = OutPoint::new(genesis.txs[0].hash(), 0);
        let chain = Arc::new(ChainAdapter::new(genesis));
        let mempool = MempoolAdapter::new(
            MempoolConfig::for_testing(),
            chain.clone(),
            Arc::new(FixedTimeSource::new(1_000)),
        );
        (chain, mempool, coinbase)
    }

    #[tokio::test]
    async fn test_accepts_confirmed_spend_and_notifies() {
        let (_chain, mempool, coinbase) = setup();
        let mut accepted = mempool.subscribe_txs();
        let tx = pay(coinbase, COINBASE_VALUE, &address(2));

        let outcome = mempool.add_tx(tx.clone()).await.unwrap();
        assert_eq!(outcome, AddOutcome::Accepted(tx.hash()));
        assert!(mempool.is_spent(&coinbase));
        assert_eq!(accepted.recv().await.unwrap(), tx);
    }

    #[tokio::test]
    async fn test_orphan_is_not_stored() {
        let (_chain, mempool, _) = setup();
        let unknown = OutPoint::new([7; 32], 0);
        let tx = pay(unknown, COINBASE_VALUE, &address(2));

        let outcome = mempool.add_tx(tx.clone()).await.unwrap();
        assert_eq!(outcome, AddOutcome::Orphan { missing: vec![[7; 32]] });
        assert!(!mempool.has_tx(&tx.hash()));
    }

    #[tokio::test]
    async fn test_rejection_maps_to_verification() {
        let (_chain, mempool, coinbase) = setup();
        let tx = pay(coinbase, COINBASE_VALUE, &address(2));
        mempool.add_tx(tx.clone()).await.unwrap();

        let err = mempool.add_tx(tx).await.unwrap_err();
        let verification = err.verification().unwrap();
        assert_eq!(verification.code, "txn-already-in-mempool");
        assert!(verification.is_policy());
    }

    #[tokio::test]
    async fn test_block_cycle_reinstates() {
        let (chain, mempool, coinbase) = setup();
        let tx = pay(coinbase, COINBASE_VALUE, &address(2));
        mempool.add_tx(tx.clone()).await.unwrap();

        let block = next_block(&chain.tip(), &address(1), vec![tx.clone()]);
        let entry = chain.connect_block(block.clone()).await.unwrap();
        let removal = mempool.add_block(&entry, &block.txs).await.unwrap();
        assert_eq!(removal.confirmed, vec![tx.hash()]);
        assert!(mempool.hashes().is_empty());

        chain.disconnect_tip().await.unwrap();
        let result = mempool.remove_block(&entry, &block.txs).await.unwrap();
        assert_eq!(result.reinstated, vec![tx.hash()]);
        assert!(result.failed.is_empty());
        assert!(mempool.has_tx(&tx.hash()));
    }

    #[tokio::test]
    async fn test_reorg_evicts_spends_of_vanished_coins() {
        let (chain, mempool, _) = setup();
        let b1 = next_block(&chain.tip(), &address(1), vec![]);
        let b1_coinbase = OutPoint::new(b1.txs[0].hash(), 0);
        chain.connect_block(b1).await.unwrap();

        let tx = pay(b1_coinbase, COINBASE_VALUE, &address(2));
        mempool.add_tx(tx.clone()).await.unwrap();

        let tip = chain.disconnect_tip().await.unwrap();
        let evicted = mempool.handle_reorg(&tip).await.unwrap();
        assert_eq!(evicted, vec![tx.hash()]);
        assert!(!mempool.has_tx(&tx.hash()));
    }

    #[tokio::test]
    async fn test_block_applied_during_admission_evicts_the_spend() {
        let genesis = genesis_block(&address(1));
        let coinbase = OutPoint::new(genesis.txs[0].hash(), 0);
        let inner = Arc::new(ChainAdapter::new(genesis));
        let chain = Arc::new(ParkedLookupChain {
            inner: inner.clone(),
            armed: AtomicBool::new(true),
            parked: Notify::new(),
            release: Notify::new(),
        });
        let mempool = Arc::new(MempoolAdapter::new(
            MempoolConfig::for_testing(),
            chain.clone(),
            Arc::new(FixedTimeSource::new(1_000)),
        ));

        let tx = pay(coinbase, COINBASE_VALUE, &address(2));
        let admitting = tokio::spawn({
            let mempool = mempool.clone();
            let tx = tx.clone();
            async move { mempool.add_tx(tx).await }
        });
        chain.parked.notified().await;

        // A rival spend of the same coin confirms while the lookup is parked.
        let rival = pay(coinbase, COINBASE_VALUE, &address(4));
        let block = next_block(&inner.tip(), &address(1), vec![rival]);
        let entry = inner.connect_block(block.clone()).await.unwrap();
        let connecting = tokio::spawn({
            let mempool = mempool.clone();
            async move { mempool.add_block(&entry, &block.txs).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        chain.release.notify_one();

        admitting.await.unwrap().unwrap();
        let removal = connecting.await.unwrap().unwrap();
        assert_eq!(removal.conflicts, vec![tx.hash()]);
        assert!(!mempool.has_tx(&tx.hash()));
        assert!(!mempool.is_spent(&coinbase));
        assert!(inner.get_coin(&coinbase).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_drops_everything() {
        let (chain, mempool, coinbase) = setup();
        mempool
            .add_tx(pay(coinbase, COINBASE_VALUE, &address(2)))
            .await
            .unwrap();
        mempool.reset(&chain.tip()).await.unwrap();
        assert_eq!(mempool.status().tx_count, 0);
    }
}
