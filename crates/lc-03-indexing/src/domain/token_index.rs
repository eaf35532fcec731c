//! Token index: confirmed per-output token records and genesis records.

use super::errors::IndexError;
use super::indexer::BlockIndexer;
use shared_types::{
    token_data_for_tx, Block, ChainEntry, CoinTokenRecord, CoinView, Hash, OutPoint, TokenRecord,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct HeightRecords {
    txs: Vec<Hash>,
    /// Lookup keys of tokens created at this height.
    tokens: Vec<Hash>,
}

#[derive(Debug, Default)]
pub struct TokenIndex {
    records: HashMap<Hash, Vec<CoinTokenRecord>>,
    /// Descriptive records keyed by `TokenId::lookup_key`.
    tokens: HashMap<Hash, TokenRecord>,
    heights: BTreeMap<u32, HeightRecords>,
    synced: Option<u32>,
    syncing: bool,
}

impl TokenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set while the index is being rolled back and replayed.
    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    pub fn set_syncing(&mut self, syncing: bool) {
        self.syncing = syncing;
    }

    pub fn get_tx_records(&self, hash: &Hash) -> Vec<CoinTokenRecord> {
        self.records.get(hash).cloned().unwrap_or_default()
    }

    pub fn get_coin_record(&self, outpoint: &OutPoint) -> Option<CoinTokenRecord> {
        self.records
            .get(&outpoint.hash)?
            .iter()
            .find(|r| r.outpoint == *outpoint)
            .cloned()
    }

    pub fn get_token_record(&self, key: &Hash) -> Option<TokenRecord> {
        self.tokens.get(key).cloned()
    }
}

impl BlockIndexer for TokenIndex {
    fn name(&self) -> &'static str {
        "tokenindex"
    }

    fn synced_height(&self) -> Option<u32> {
        self.synced
    }

    fn index_block(
        &mut self,
        entry: &ChainEntry,
        block: &Block,
        _view: &CoinView,
    ) -> Result<(), IndexError> {
        self.check_next(entry)?;
        let mut at_height = HeightRecords::default();

        for tx in &block.txs {
            let hash = tx.hash();
            let data = token_data_for_tx(tx, hash);
            if !data.records.is_empty() {
                self.records.insert(hash, data.records);
                at_height.txs.push(hash);
            }
            if let Some(token) = data.token {
                let key = token.token_id.lookup_key();
                self.tokens.insert(key, token);
                at_height.tokens.push(key);
            }
        }

        self.heights.insert(entry.height, at_height);
        self.synced = Some(entry.height);
        Ok(())
    }

    fn rollback(&mut self, height: u32) {
        let Some(first_removed) = height.checked_add(1) else {
            return;
        };
        for (_, at_height) in self.heights.split_off(&first_removed) {
            for hash in at_height.txs {
                self.records.remove(&hash);
            }
            for key in at_height.tokens {
                self.tokens.remove(&key);
            }
        }
        if self.synced.is_some_and(|h| h > height) {
            self.synced = Some(height);
        }
    }

    fn clear(&mut self) {
        self.records.clear();
        self.tokens.clear();
        self.heights.clear();
        self.synced = None;
    }
}
