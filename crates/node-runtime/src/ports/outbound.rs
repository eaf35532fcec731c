//! Outbound ports (driven side).

use async_trait::async_trait;
use lc_01_mempool::BlockRemoval;
use shared_bus::ChainEvent;
use shared_types::{
    Address, AddressQuery, Block, ChainEntry, Coin, CoinTokenRecord, CoinView, Hash,
    InventoryItem, OutPoint, TokenRecord, Transaction, TxMeta,
};
use tokio::sync::broadcast;

use crate::error::NodeError;

/// Receives chain lifecycle events in the order the chain applied them.
#[async_trait]
pub trait ChainEventSink: Send + Sync {
    async fn deliver(&self, event: ChainEvent);
}

/// Confirmed chain and block store.
#[async_trait]
pub trait ChainPort: Send + Sync {
    fn tip(&self) -> ChainEntry;

    async fn get_entry_by_height(&self, height: u32) -> Result<Option<ChainEntry>, NodeError>;

    async fn get_block(&self, hash: &Hash) -> Result<Option<Block>, NodeError>;

    /// Coins spent by a main-chain block.
    async fn get_block_view(&self, hash: &Hash) -> Result<Option<CoinView>, NodeError>;

    /// Unspent confirmed coin.
    async fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, NodeError>;

    /// Routes lifecycle events to `sink` from now on.
    fn attach(&self, sink: std::sync::Arc<dyn ChainEventSink>);

    fn detach(&self);
}

/// Result of offering a transaction to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted(Hash),
    /// Some inputs resolve neither in the pool nor on chain. Nothing stored.
    Orphan { missing: Vec<Hash> },
}

/// Outcome of re-admitting a disconnected block's transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reinstatement {
    pub reinstated: Vec<Hash>,
    pub failed: Vec<Hash>,
}

/// Pending transaction pool.
///
/// Lookups are synchronous; the pool lives in memory next to the core.
#[async_trait]
pub trait MempoolPort: Send + Sync {
    async fn add_tx(&self, tx: Transaction) -> Result<AddOutcome, NodeError>;

    fn has_tx(&self, hash: &Hash) -> bool;

    fn hashes(&self) -> Vec<Hash>;

    /// Unspent output of a pool transaction.
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// True when a pool transaction spends `outpoint`.
    fn is_spent(&self, outpoint: &OutPoint) -> bool;

    fn get_coins_by_address(&self, address: &Address) -> Vec<Coin>;

    fn get_meta(&self, hash: &Hash) -> Option<TxMeta>;

    fn get_metas_by_address(&self, address: &Address, query: &AddressQuery) -> Vec<TxMeta>;

    /// Coins spent by a pool transaction.
    fn get_spent_view(&self, tx: &Transaction) -> CoinView;

    fn get_tx_token_records(&self, hash: &Hash) -> Vec<CoinTokenRecord>;

    fn get_coin_token_record(&self, outpoint: &OutPoint) -> Option<CoinTokenRecord>;

    fn get_token_record(&self, key: &Hash) -> Option<TokenRecord>;

    /// Accepted transactions, as the pool admits them.
    fn subscribe_txs(&self) -> broadcast::Receiver<Transaction>;

    /// Drops what a connected block confirmed or double-spent.
    async fn add_block(
        &self,
        entry: &ChainEntry,
        txs: &[Transaction],
    ) -> Result<BlockRemoval, NodeError>;

    /// Re-admits a disconnected block's non-coinbase transactions.
    async fn remove_block(
        &self,
        entry: &ChainEntry,
        txs: &[Transaction],
    ) -> Result<Reinstatement, NodeError>;

    /// Evicts every transaction whose confirmed inputs vanished with a
    /// reorganization. Returns the evicted hashes.
    async fn handle_reorg(&self, tip: &ChainEntry) -> Result<Vec<Hash>, NodeError>;

    async fn reset(&self, tip: &ChainEntry) -> Result<(), NodeError>;
}

/// What every optional index shares with the reconciler.
#[async_trait]
pub trait IndexSync: Send + Sync {
    fn name(&self) -> &'static str;

    fn synced_height(&self) -> Option<u32>;

    async fn index_block(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), NodeError>;

    async fn unindex_block(&self, entry: &ChainEntry) -> Result<(), NodeError>;

    /// Drops everything above `height`.
    async fn rollback(&self, height: u32) -> Result<(), NodeError>;

    /// This index as its sync half, for code that drives every index alike.
    fn as_sync(&self) -> &dyn IndexSync;
}

#[async_trait]
pub trait TxIndexPort: IndexSync {
    async fn get_meta(&self, hash: &Hash) -> Result<Option<TxMeta>, NodeError>;

    async fn has_tx(&self, hash: &Hash) -> Result<bool, NodeError>;

    async fn get_spent_view(&self, tx: &Transaction) -> Result<Option<CoinView>, NodeError>;
}

#[async_trait]
pub trait AddrIndexPort: IndexSync {
    async fn get_hashes_by_address(
        &self,
        address: &Address,
        query: &AddressQuery,
    ) -> Result<Vec<Hash>, NodeError>;

    async fn get_coins_by_address(&self, address: &Address) -> Result<Vec<Coin>, NodeError>;
}

#[async_trait]
pub trait TokenIndexPort: IndexSync {
    fn is_syncing(&self) -> bool;

    fn set_syncing(&self, syncing: bool);

    async fn get_tx_records(&self, hash: &Hash) -> Result<Vec<CoinTokenRecord>, NodeError>;

    async fn get_coin_record(
        &self,
        outpoint: &OutPoint,
    ) -> Result<Option<CoinTokenRecord>, NodeError>;

    /// Descriptive record by `TokenId::lookup_key`.
    async fn get_token_record(&self, key: &Hash) -> Result<Option<TokenRecord>, NodeError>;
}

/// Peer-to-peer relay.
#[async_trait]
pub trait RelayPort: Send + Sync {
    async fn broadcast(&self, item: InventoryItem) -> Result<(), NodeError>;

    async fn connect(&self) -> Result<(), NodeError>;

    async fn disconnect(&self) -> Result<(), NodeError>;

    async fn start_sync(&self) -> Result<(), NodeError>;

    async fn stop_sync(&self) -> Result<(), NodeError>;
}

/// Block template builder notified of accepted transactions.
pub trait MinerPort: Send + Sync {
    fn notify_entry(&self, tx: &Transaction);
}
