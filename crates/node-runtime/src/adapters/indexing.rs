//! # Index Adapters
//!
//! One generic adapter serves every lc-03 index; the query capabilities
//! are implemented per index type.

use async_trait::async_trait;
use lc_03_indexing::{AddrIndex, BlockIndexer, TokenIndex, TxIndex};
use parking_lot::RwLock;
use shared_types::{
    Address, AddressQuery, Block, ChainEntry, Coin, CoinTokenRecord, CoinView, Hash, OutPoint,
    TokenRecord, Transaction, TxMeta,
};
use tracing::debug;

use crate::error::NodeError;
use crate::ports::{AddrIndexPort, IndexSync, TokenIndexPort, TxIndexPort};

pub struct IndexAdapter<I> {
    index: RwLock<I>,
}

pub type TxIndexAdapter = IndexAdapter<TxIndex>;
pub type AddrIndexAdapter = IndexAdapter<AddrIndex>;
pub type TokenIndexAdapter = IndexAdapter<TokenIndex>;

impl<I: BlockIndexer> IndexAdapter<I> {
    pub fn new(index: I) -> Self {
        Self {
            index: RwLock::new(index),
        }
    }
}

#[async_trait]
impl<I: BlockIndexer + 'static> IndexSync for IndexAdapter<I> {
    fn name(&self) -> &'static str {
        self.index.read().name()
    }

    fn synced_height(&self) -> Option<u32> {
        self.index.read().synced_height()
    }

    async fn index_block(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), NodeError> {
        let mut index = self.index.write();
        index.index_block(entry, block, view)?;
        debug!(index = index.name(), height = entry.height, "[lc-03] Block indexed");
        Ok(())
    }

    async fn unindex_block(&self, entry: &ChainEntry) -> Result<(), NodeError> {
        let mut index = self.index.write();
        index.unindex_block(entry)?;
        debug!(index = index.name(), height = entry.height, "[lc-03] Block unindexed");
        Ok(())
    }

    async fn rollback(&self, height: u32) -> Result<(), NodeError> {
        let mut index = self.index.write();
        index.rollback(height);
        debug!(index = index.name(), height, "[lc-03] Rolled back");
        Ok(())
    }

    fn as_sync(&self) -> &dyn IndexSync {
        self
    }
}

#[async_trait]
impl TxIndexPort for TxIndexAdapter {
    async fn get_meta(&self, hash: &Hash) -> Result<Option<TxMeta>, NodeError> {
        Ok(self.index.read().get_meta(hash))
    }

    async fn has_tx(&self, hash: &Hash) -> Result<bool, NodeError> {
        Ok(self.index.read().has_tx(hash))
    }

    async fn get_spent_view(&self, tx: &Transaction) -> Result<Option<CoinView>, NodeError> {
        Ok(self.index.read().get_spent_view(tx))
    }
}

#[async_trait]
impl AddrIndexPort for AddrIndexAdapter {
    async fn get_hashes_by_address(
        &self,
        address: &Address,
        query: &AddressQuery,
    ) -> Result<Vec<Hash>, NodeError> {
        Ok(self.index.read().get_hashes(address, query)?)
    }

    async fn get_coins_by_address(&self, address: &Address) -> Result<Vec<Coin>, NodeError> {
        Ok(self.index.read().get_coins(address))
    }
}

#[async_trait]
impl TokenIndexPort for TokenIndexAdapter {
    fn is_syncing(&self) -> bool {
        self.index.read().is_syncing()
    }

    fn set_syncing(&self, syncing: bool) {
        self.index.write().set_syncing(syncing);
    }

    async fn get_tx_records(&self, hash: &Hash) -> Result<Vec<CoinTokenRecord>, NodeError> {
        Ok(self.index.read().get_tx_records(hash))
    }

    async fn get_coin_record(
        &self,
        outpoint: &OutPoint,
    ) -> Result<Option<CoinTokenRecord>, NodeError> {
        Ok(self.index.read().get_coin_record(outpoint))
    }

    async fn get_token_record(&self, key: &Hash) -> Result<Option<TokenRecord>, NodeError> {
        Ok(self.index.read().get_token_record(key))
    }
}
