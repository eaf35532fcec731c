//! # Chain Store
//!
//! Main chain, block store, unspent set and per-block undo data. Every
//! mutation returns the lifecycle events it produced, in emission order.

use super::errors::ChainError;
use shared_bus::ChainEvent;
use shared_types::{Block, ChainEntry, Coin, CoinView, Hash, OutPoint};
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct ChainStore {
    entries: HashMap<Hash, ChainEntry>,
    blocks: HashMap<Hash, Block>,
    /// Main-chain hashes by height.
    main: Vec<Hash>,
    tip: ChainEntry,
    coins: HashMap<OutPoint, Coin>,
    /// Coins spent by each main-chain block.
    undo: HashMap<Hash, CoinView>,
}

impl ChainStore {
    /// Creates a chain holding only `genesis`, whose outputs become spendable.
    pub fn new(genesis: Block) -> Self {
        let entry = ChainEntry::from_block(&genesis, None);
        let mut coins = HashMap::new();
        for tx in &genesis.txs {
            let hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                if output.is_null_data() {
                    continue;
                }
                if let Some(coin) = Coin::from_tx(tx, hash, index as u32, 0) {
                    coins.insert(coin.outpoint, coin);
                }
            }
        }

        Self {
            entries: HashMap::from([(entry.hash, entry.clone())]),
            blocks: HashMap::from([(entry.hash, genesis)]),
            main: vec![entry.hash],
            undo: HashMap::from([(entry.hash, CoinView::new())]),
            tip: entry,
            coins,
        }
    }

    pub fn tip(&self) -> &ChainEntry {
        &self.tip
    }

    pub fn height(&self) -> u32 {
        self.tip.height
    }

    pub fn genesis_hash(&self) -> Hash {
        self.main[0]
    }

    pub fn get_entry(&self, hash: &Hash) -> Option<&ChainEntry> {
        self.entries.get(hash)
    }

    pub fn get_entry_by_height(&self, height: u32) -> Option<&ChainEntry> {
        self.main
            .get(height as usize)
            .and_then(|hash| self.entries.get(hash))
    }

    pub fn is_main(&self, hash: &Hash) -> bool {
        self.entries
            .get(hash)
            .is_some_and(|entry| self.main.get(entry.height as usize) == Some(hash))
    }

    /// Any block the chain has seen, main chain or not.
    pub fn get_block(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Coins spent by a main-chain block.
    pub fn get_undo(&self, hash: &Hash) -> Option<&CoinView> {
        self.undo.get(hash)
    }

    /// Unspent output on the main chain.
    pub fn get_coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    /// Connects `block` on top of the tip.
    pub fn connect(&mut self, block: Block) -> Result<ChainEvent, ChainError> {
        let hash = block.hash();
        let parent_hash = block.prev_hash();
        if self.is_main(&hash) {
            return Err(ChainError::BlockExists { hash });
        }
        if parent_hash != self.tip.hash {
            return Err(if self.entries.contains_key(&parent_hash) {
                ChainError::NotExtendingTip {
                    parent_hash,
                    tip: self.tip.hash,
                }
            } else {
                ChainError::ParentNotFound { parent_hash }
            });
        }
        match block.txs.first() {
            Some(first) if first.is_coinbase() => {}
            _ => return Err(ChainError::InvalidBlock("first transaction is not a coinbase".into())),
        }
        if block.txs.iter().skip(1).any(|tx| tx.is_coinbase()) {
            return Err(ChainError::InvalidBlock("more than one coinbase".into()));
        }

        let entry = ChainEntry::from_block(&block, Some(&self.tip));
        let height = i64::from(entry.height);

        // Stage against an overlay so a failing block leaves no trace.
        let mut created: HashMap<OutPoint, Coin> = HashMap::new();
        let mut view = CoinView::new();
        for tx in &block.txs {
            let tx_hash = tx.hash();
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let prevout = input.prevout;
                    let coin = match created.remove(&prevout) {
                        Some(coin) => coin,
                        None if view.contains(&prevout) => {
                            return Err(ChainError::MissingInput { outpoint: prevout })
                        }
                        None => self
                            .coins
                            .get(&prevout)
                            .cloned()
                            .ok_or(ChainError::MissingInput { outpoint: prevout })?,
                    };
                    view.add(coin);
                }
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                if output.is_null_data() {
                    continue;
                }
                if let Some(coin) = Coin::from_tx(tx, tx_hash, index as u32, height) {
                    created.insert(coin.outpoint, coin);
                }
            }
        }

        for coin in view.iter() {
            self.coins.remove(&coin.outpoint);
        }
        self.coins.extend(created);
        self.undo.insert(entry.hash, view.clone());
        self.entries.insert(entry.hash, entry.clone());
        self.blocks.insert(entry.hash, block.clone());
        self.main.push(entry.hash);
        self.tip = entry.clone();

        Ok(ChainEvent::Connect { entry, block, view })
    }

    /// Disconnects the tip block, restoring the coins it spent.
    pub fn disconnect_tip(&mut self) -> Result<ChainEvent, ChainError> {
        if self.tip.height == 0 {
            return Err(ChainError::GenesisImmutable);
        }
        let entry = self.tip.clone();
        let block = self
            .blocks
            .get(&entry.hash)
            .cloned()
            .ok_or(ChainError::BlockNotFound { hash: entry.hash })?;
        let prev = self
            .entries
            .get(&entry.prev_hash)
            .cloned()
            .ok_or(ChainError::ParentNotFound {
                parent_hash: entry.prev_hash,
            })?;
        let view = self
            .undo
            .remove(&entry.hash)
            .ok_or(ChainError::UndoMissing { hash: entry.hash })?;

        let block_txs: HashSet<Hash> = block.txs.iter().map(|tx| tx.hash()).collect();
        for tx in &block.txs {
            let tx_hash = tx.hash();
            for index in 0..tx.outputs.len() as u32 {
                self.coins.remove(&OutPoint::new(tx_hash, index));
            }
        }
        for coin in view.iter() {
            if !block_txs.contains(&coin.outpoint.hash) {
                self.coins.insert(coin.outpoint, coin.clone());
            }
        }

        self.main.pop();
        self.tip = prev;
        Ok(ChainEvent::Disconnect { entry, block, view })
    }

    /// Switches the main chain to `fork` followed by `blocks`.
    ///
    /// Emits one disconnect per removed block, one connect per new block and
    /// finally a reorganize event. On failure the original chain is restored.
    pub fn reorganize(
        &mut self,
        fork: Hash,
        blocks: Vec<Block>,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        if !self.is_main(&fork) {
            return Err(ChainError::ForkNotOnMainChain { hash: fork });
        }
        let old_tip = self.tip.clone();
        let mut events = Vec::new();
        let mut detached = Vec::new();

        while self.tip.hash != fork {
            let event = self.disconnect_tip()?;
            if let ChainEvent::Disconnect { block, .. } = &event {
                detached.push(block.clone());
            }
            events.push(event);
        }

        let mut attached = 0usize;
        for block in blocks {
            match self.connect(block) {
                Ok(event) => {
                    attached += 1;
                    events.push(event);
                }
                Err(err) => {
                    self.restore(attached, detached)?;
                    return Err(err);
                }
            }
        }

        events.push(ChainEvent::Reorganize {
            new_tip: self.tip.clone(),
            old_tip,
        });
        Ok(events)
    }

    fn restore(&mut self, attached: usize, mut detached: Vec<Block>) -> Result<(), ChainError> {
        for _ in 0..attached {
            self.disconnect_tip()?;
        }
        while let Some(block) = detached.pop() {
            self.connect(block)?;
        }
        Ok(())
    }

    /// Rewinds the main chain to `height` and emits a single reset event.
    pub fn reset(&mut self, height: u32) -> Result<ChainEvent, ChainError> {
        if height > self.tip.height {
            return Err(ChainError::HeightNotFound { height });
        }
        while self.tip.height > height {
            self.disconnect_tip()?;
        }
        Ok(ChainEvent::Reset {
            tip: self.tip.clone(),
        })
    }

    /// Main-chain entries and blocks from `start` up to the tip.
    pub fn main_blocks_from(&self, start: u32) -> Vec<(ChainEntry, Block)> {
        (start..=self.tip.height)
            .filter_map(|height| {
                let entry = self.get_entry_by_height(height)?;
                let block = self.blocks.get(&entry.hash)?;
                Some((entry.clone(), block.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::test_utils::{
        address, genesis_block, next_block, next_block_with_nonce, pay, COINBASE_VALUE, FIXTURE_FEE,
    };

    fn chain() -> ChainStore {
        ChainStore::new(genesis_block(&address(1)))
    }

    fn genesis_coin(chain: &ChainStore) -> OutPoint {
        let genesis = chain.get_block(&chain.genesis_hash()).unwrap();
        OutPoint::new(genesis.txs[0].hash(), 0)
    }

    #[test]
    fn test_connect_spends_and_creates_coins() {
        let mut chain = chain();
        let prevout = genesis_coin(&chain);
        let tx = pay(prevout, COINBASE_VALUE, &address(2));
        let block = next_block(chain.tip(), &address(1), vec![tx.clone()]);

        let event = chain.connect(block).unwrap();
        let ChainEvent::Connect { entry, view, .. } = event else {
            panic!("expected connect");
        };
        assert_eq!(entry.height, 1);
        assert!(view.contains(&prevout));
        assert!(chain.get_coin(&prevout).is_none());
        let created = chain.get_coin(&OutPoint::new(tx.hash(), 0)).unwrap();
        assert_eq!(created.height, 1);
        assert_eq!(created.value, COINBASE_VALUE - FIXTURE_FEE);
    }

    #[test]
    fn test_connect_rejects_missing_input_without_side_effects() {
        let mut chain = chain();
        let before = chain.coin_count();
        let tx = pay(OutPoint::new([9; 32], 0), COINBASE_VALUE, &address(2));
        let block = next_block(chain.tip(), &address(1), vec![tx]);
        assert!(matches!(
            chain.connect(block),
            Err(ChainError::MissingInput { .. })
        ));
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.coin_count(), before);
    }

    #[test]
    fn test_connect_rejects_wrong_parent() {
        let mut chain = chain();
        let genesis = chain.tip().clone();
        let b1 = next_block(&genesis, &address(1), vec![]);
        chain.connect(b1).unwrap();
        let sibling = next_block_with_nonce(&genesis, &address(1), vec![], 7);
        assert!(matches!(
            chain.connect(sibling),
            Err(ChainError::NotExtendingTip { .. })
        ));
    }

    #[test]
    fn test_intra_block_spend() {
        let mut chain = chain();
        let parent = pay(genesis_coin(&chain), COINBASE_VALUE, &address(2));
        let child = pay(OutPoint::new(parent.hash(), 0), COINBASE_VALUE - FIXTURE_FEE, &address(3));
        let block = next_block(chain.tip(), &address(1), vec![parent.clone(), child.clone()]);
        chain.connect(block).unwrap();
        assert!(chain.get_coin(&OutPoint::new(parent.hash(), 0)).is_none());
        assert!(chain.get_coin(&OutPoint::new(child.hash(), 0)).is_some());

        chain.disconnect_tip().unwrap();
        assert!(chain.get_coin(&genesis_coin(&chain)).is_some());
        assert!(chain.get_coin(&OutPoint::new(parent.hash(), 0)).is_none());
        assert!(chain.get_coin(&OutPoint::new(child.hash(), 0)).is_none());
    }

    #[test]
    fn test_disconnect_restores_spent_coins() {
        let mut chain = chain();
        let prevout = genesis_coin(&chain);
        let tx = pay(prevout, COINBASE_VALUE, &address(2));
        chain
            .connect(next_block(chain.tip(), &address(1), vec![tx.clone()]))
            .unwrap();

        let event = chain.disconnect_tip().unwrap();
        assert_eq!(event.kind(), "disconnect");
        assert_eq!(chain.height(), 0);
        assert!(chain.get_coin(&prevout).is_some());
        assert!(chain.get_coin(&OutPoint::new(tx.hash(), 0)).is_none());
        assert!(matches!(chain.disconnect_tip(), Err(ChainError::GenesisImmutable)));
    }

    #[test]
    fn test_reorganize_event_order() {
        let mut chain = chain();
        let genesis = chain.tip().clone();
        chain.connect(next_block(&genesis, &address(1), vec![])).unwrap();
        let old_tip = chain.tip().clone();

        let alt1 = next_block_with_nonce(&genesis, &address(1), vec![], 1);
        let alt1_entry = ChainEntry::from_block(&alt1, Some(&genesis));
        let alt2 = next_block_with_nonce(&alt1_entry, &address(1), vec![], 1);

        let events = chain.reorganize(genesis.hash, vec![alt1, alt2]).unwrap();
        let kinds: Vec<&str> = events.iter().map(ChainEvent::kind).collect();
        assert_eq!(kinds, vec!["disconnect", "connect", "connect", "reorganize"]);
        assert_eq!(chain.height(), 2);
        match events.last().unwrap() {
            ChainEvent::Reorganize { new_tip, old_tip: old } => {
                assert_eq!(new_tip, chain.tip());
                assert_eq!(old, &old_tip);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failed_reorganize_restores_chain() {
        let mut chain = chain();
        let genesis = chain.tip().clone();
        chain.connect(next_block(&genesis, &address(1), vec![])).unwrap();
        let tip = chain.tip().clone();

        let bad_tx = pay(OutPoint::new([5; 32], 0), COINBASE_VALUE, &address(2));
        let bad = next_block_with_nonce(&genesis, &address(1), vec![bad_tx], 3);
        assert!(chain.reorganize(genesis.hash, vec![bad]).is_err());
        assert_eq!(chain.tip(), &tip);
    }

    #[test]
    fn test_reset_and_main_blocks() {
        let mut chain = chain();
        for _ in 0..3 {
            let block = next_block(chain.tip(), &address(1), vec![]);
            chain.connect(block).unwrap();
        }
        assert_eq!(chain.main_blocks_from(2).len(), 2);

        let event = chain.reset(1).unwrap();
        assert!(matches!(event, ChainEvent::Reset { ref tip } if tip.height == 1));
        assert_eq!(chain.height(), 1);
        assert!(chain.get_entry_by_height(2).is_none());
    }
}
