//! Address index: per-address confirmed history and unspent coins.
//!
//! History order is indexing order, which is confirmation order. Each
//! indexed height keeps a journal so rollback can undo it exactly.

use super::errors::IndexError;
use super::indexer::BlockIndexer;
use shared_types::{
    Address, AddressQuery, Block, ChainEntry, Coin, CoinView, Hash, HistorySegment, OutPoint,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Default cap on results per history query.
pub const DEFAULT_MAX_TXS: usize = 100;

#[derive(Debug, Default)]
struct BlockJournal {
    history: Vec<(Address, Hash)>,
    added: Vec<Coin>,
    spent: Vec<Coin>,
}

#[derive(Debug)]
pub struct AddrIndex {
    max_txs: usize,
    histories: HashMap<Address, Vec<Hash>>,
    coins: HashMap<Address, BTreeMap<OutPoint, Coin>>,
    journal: BTreeMap<u32, BlockJournal>,
    synced: Option<u32>,
}

impl Default for AddrIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TXS)
    }
}

impl AddrIndex {
    pub fn new(max_txs: usize) -> Self {
        Self {
            max_txs,
            histories: HashMap::new(),
            coins: HashMap::new(),
            journal: BTreeMap::new(),
            synced: None,
        }
    }

    pub fn max_txs(&self) -> usize {
        self.max_txs
    }

    /// A page of confirmed transaction hashes for `address`.
    ///
    /// Without a limit the page holds at most `max_txs` hashes; an explicit
    /// limit above `max_txs` is rejected.
    pub fn get_hashes(&self, address: &Address, query: &AddressQuery) -> Result<Vec<Hash>, IndexError> {
        let limit = match query.bound() {
            Some(requested) if requested > self.max_txs => {
                return Err(IndexError::LimitExceeded {
                    requested,
                    max: self.max_txs,
                })
            }
            Some(requested) => requested,
            None => self.max_txs,
        };
        let Some(history) = self.histories.get(address) else {
            return Ok(Vec::new());
        };
        Ok(query
            .with_limit(Some(limit))
            .page(history, HistorySegment::Confirmed))
    }

    /// Confirmed unspent coins paying `address`, in outpoint order.
    pub fn get_coins(&self, address: &Address) -> Vec<Coin> {
        self.coins
            .get(address)
            .map(|coins| coins.values().cloned().collect())
            .unwrap_or_default()
    }

    fn add_coin(&mut self, coin: Coin) -> bool {
        match coin.address() {
            Some(address) => {
                self.coins.entry(address).or_default().insert(coin.outpoint, coin);
                true
            }
            None => false,
        }
    }

    fn remove_coin(&mut self, coin: &Coin) -> bool {
        let Some(address) = coin.address() else {
            return false;
        };
        let Some(coins) = self.coins.get_mut(&address) else {
            return false;
        };
        let removed = coins.remove(&coin.outpoint).is_some();
        if coins.is_empty() {
            self.coins.remove(&address);
        }
        removed
    }
}

impl BlockIndexer for AddrIndex {
    fn name(&self) -> &'static str {
        "addrindex"
    }

    fn synced_height(&self) -> Option<u32> {
        self.synced
    }

    fn index_block(
        &mut self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexError> {
        self.check_next(entry)?;
        let height = i64::from(entry.height);
        let mut journal = BlockJournal::default();

        for tx in &block.txs {
            let hash = tx.hash();
            let mut touched = HashSet::new();

            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let Some(coin) = view.get(&input.prevout) else {
                        continue;
                    };
                    if let Some(address) = coin.address() {
                        touched.insert(address);
                    }
                    if self.remove_coin(coin) {
                        journal.spent.push(coin.clone());
                    }
                }
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                let Some(address) = output.address() else {
                    continue;
                };
                touched.insert(address);
                if let Some(coin) = Coin::from_tx(tx, hash, index as u32, height) {
                    if self.add_coin(coin.clone()) {
                        journal.added.push(coin);
                    }
                }
            }

            let mut touched: Vec<Address> = touched.into_iter().collect();
            touched.sort();
            for address in touched {
                self.histories.entry(address).or_default().push(hash);
                journal.history.push((address, hash));
            }
        }

        self.journal.insert(entry.height, journal);
        self.synced = Some(entry.height);
        Ok(())
    }

    fn rollback(&mut self, height: u32) {
        let Some(first_removed) = height.checked_add(1) else {
            return;
        };
        let undone = self.journal.split_off(&first_removed);
        for (_, journal) in undone.into_iter().rev() {
            for coin in journal.spent {
                self.add_coin(coin);
            }
            for coin in &journal.added {
                self.remove_coin(coin);
            }
            for (address, hash) in journal.history.into_iter().rev() {
                if let Some(history) = self.histories.get_mut(&address) {
                    if history.last() == Some(&hash) {
                        history.pop();
                    } else {
                        history.retain(|h| *h != hash);
                    }
                    if history.is_empty() {
                        self.histories.remove(&address);
                    }
                }
            }
        }
        if self.synced.is_some_and(|h| h > height) {
            self.synced = Some(height);
        }
    }

    fn clear(&mut self) {
        self.histories.clear();
        self.coins.clear();
        self.journal.clear();
        self.synced = None;
    }
}
