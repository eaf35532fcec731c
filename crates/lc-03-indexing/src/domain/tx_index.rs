//! Transaction index: confirmed metadata and spent views by hash.

use super::errors::IndexError;
use super::indexer::BlockIndexer;
use shared_types::{Block, ChainEntry, CoinView, Hash, Transaction, TxMeta};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct IndexedTx {
    meta: TxMeta,
    view: CoinView,
}

#[derive(Debug, Default)]
pub struct TxIndex {
    records: HashMap<Hash, IndexedTx>,
    heights: BTreeMap<u32, Vec<Hash>>,
    synced: Option<u32>,
}

impl TxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_meta(&self, hash: &Hash) -> Option<TxMeta> {
        self.records.get(hash).map(|r| r.meta.clone())
    }

    pub fn has_tx(&self, hash: &Hash) -> bool {
        self.records.contains_key(hash)
    }

    /// Coins `tx` consumed, as recorded when its block was indexed.
    pub fn get_spent_view(&self, tx: &Transaction) -> Option<CoinView> {
        self.records.get(&tx.hash()).map(|r| r.view.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl BlockIndexer for TxIndex {
    fn name(&self) -> &'static str {
        "txindex"
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

        let mut hashes = Vec::with_capacity(block.txs.len());
        for (index, tx) in block.txs.iter().enumerate() {
            let meta = TxMeta::confirmed(tx.clone(), entry, index as u32);
            let hash = meta.hash;
            self.records.insert(
                hash,
                IndexedTx {
                    meta,
                    view: view.subset_for(tx),
                },
            );
            hashes.push(hash);
        }
        self.heights.insert(entry.height, hashes);
        self.synced = Some(entry.height);
        Ok(())
    }

    fn rollback(&mut self, height: u32) {
        let Some(first_removed) = height.checked_add(1) else {
            return;
        };
        let removed = self.heights.split_off(&first_removed);
        for hash in removed.into_values().flatten() {
            self.records.remove(&hash);
        }
        if self.synced.is_some_and(|h| h > height) {
            self.synced = Some(height);
        }
    }

    fn clear(&mut self) {
        self.records.clear();
        self.heights.clear();
        self.synced = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::test_utils::{address, genesis_block, next_block, pay, COINBASE_VALUE};
    use shared_types::{Coin, OutPoint};

    fn indexed_chain() -> (TxIndex, Vec<(ChainEntry, Block)>) {
        let genesis = genesis_block(&address(1));
        let g_entry = ChainEntry::from_block(&genesis, None);
        let prevout = OutPoint::new(genesis.txs[0].hash(), 0);
        let tx = pay(prevout, COINBASE_VALUE, &address(2));
        let b1 = next_block(&g_entry, &address(1), vec![tx]);
        let b1_entry = ChainEntry::from_block(&b1, Some(&g_entry));

        let spent = Coin::from_tx(&genesis.txs[0], prevout.hash, 0, 0).unwrap();
        let view: CoinView = std::iter::once(spent).collect();

        let mut index = TxIndex::new();
        index.index_block(&g_entry, &genesis, &CoinView::new()).unwrap();
        index.index_block(&b1_entry, &b1, &view).unwrap();
        (index, vec![(g_entry, genesis), (b1_entry, b1)])
    }

    #[test]
    fn test_meta_and_view() {
        let (index, blocks) = indexed_chain();
        let (entry, block) = &blocks[1];
        let tx = &block.txs[1];

        let meta = index.get_meta(&tx.hash()).unwrap();
        assert_eq!(meta.height, 1);
        assert_eq!(meta.index, Some(1));
        assert_eq!(meta.block, Some(entry.hash));
        assert_eq!(index.get_spent_view(tx).unwrap().len(), 1);
        assert_eq!(index.get_spent_view(&block.txs[0]).unwrap().len(), 0);
    }

    #[test]
    fn test_rejects_gaps() {
        let (mut index, blocks) = indexed_chain();
        let (entry, block) = &blocks[1];
        let err = index.index_block(entry, block, &CoinView::new()).unwrap_err();
        assert!(matches!(err, IndexError::HeightMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_unindex_tip_and_rollback() {
        let (mut index, blocks) = indexed_chain();
        let (g_entry, _) = &blocks[0];
        let (entry, block) = &blocks[1];

        assert!(index.unindex_block(g_entry).is_err());
        index.unindex_block(entry).unwrap();
        assert!(!index.has_tx(&block.txs[1].hash()));
        assert_eq!(index.synced_height(), Some(0));

        index.rollback(5);
        assert_eq!(index.synced_height(), Some(0));
        assert_eq!(index.len(), 1);
    }
}
