//! # Transaction Pool
//!
//! The pending pool: admitted transactions plus the indexes that make it a
//! virtual unspent-output layer on top of the confirmed tip.
//!
//! ## Data Structures
//!
//! - `by_hash`: entries by transaction hash
//! - `spents`: outpoint -> hash of the pool transaction spending it
//! - `by_address`: per-address admission-ordered history
//! - `token_records` / `token_defs`: the ephemeral token ledger
//!
//! ## Invariants Enforced
//!
//! - No duplicate hashes and no two entries spending the same outpoint (`add()`)
//! - Removing an entry removes every pool descendant with it when the
//!   entry's outputs cease to exist (`remove_with_descendants()`)

use super::entities::{
    Address, Coin, CoinTokenRecord, CoinView, Hash, MempoolConfig, MempoolEntry, OutPoint,
    Timestamp, TokenRecord, Transaction, TxMeta,
};
use super::errors::MempoolError;
use super::services;
use super::value_objects::{BlockRemoval, InputResolution, MempoolStatus};
use shared_types::{token_data_for_tx, AddressQuery, HistorySegment, VerificationError, UNCONFIRMED_HEIGHT};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug)]
pub struct TransactionPool {
    config: MempoolConfig,
    by_hash: HashMap<Hash, MempoolEntry>,
    spents: HashMap<OutPoint, Hash>,
    by_address: HashMap<Address, Vec<Hash>>,
    token_records: HashMap<Hash, Vec<CoinTokenRecord>>,
    /// Descriptive token records keyed by `TokenId::lookup_key`.
    token_defs: HashMap<Hash, TokenRecord>,
    total_size: usize,
    tip_height: u32,
}

impl TransactionPool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            by_hash: HashMap::new(),
            spents: HashMap::new(),
            by_address: HashMap::new(),
            token_records: HashMap::new(),
            token_defs: HashMap::new(),
            total_size: 0,
            tip_height: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn tip_height(&self) -> u32 {
        self.tip_height
    }

    pub fn set_tip_height(&mut self, height: u32) {
        self.tip_height = height;
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&MempoolEntry> {
        self.by_hash.get(hash)
    }

    /// Hashes of every admitted transaction, in no particular order.
    pub fn hashes(&self) -> Vec<Hash> {
        self.by_hash.keys().copied().collect()
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    /// Checks that can run before any input is resolved.
    pub fn precheck(&self, tx: &Transaction, hash: &Hash) -> Result<(), VerificationError> {
        services::check_sanity(tx)?;
        if tx.is_coinbase() {
            return Err(VerificationError::consensus("coinbase", "coinbase as individual tx"));
        }
        if self.by_hash.contains_key(hash) {
            return Err(VerificationError::policy(
                "txn-already-in-mempool",
                "already have transaction",
            ));
        }
        if tx.inputs.iter().any(|input| self.spents.contains_key(&input.prevout)) {
            return Err(VerificationError::policy(
                "bad-txns-inputs-spent",
                "input already spent by a pool transaction",
            ));
        }
        Ok(())
    }

    /// Resolves the inputs the pool itself can satisfy.
    pub fn resolve_inputs(&self, tx: &Transaction) -> InputResolution {
        let mut resolution = InputResolution::default();
        for input in &tx.inputs {
            let prevout = input.prevout;
            match self
                .by_hash
                .get(&prevout.hash)
                .and_then(|parent| Coin::from_tx(&parent.tx, parent.hash, prevout.index, UNCONFIRMED_HEIGHT))
            {
                Some(coin) => resolution.view.add(coin),
                None => resolution.unresolved.push(prevout),
            }
        }
        resolution
    }

    /// Admits `tx`, whose inputs must all be present in `view`.
    pub fn add(
        &mut self,
        tx: Transaction,
        view: CoinView,
        now: Timestamp,
    ) -> Result<Hash, MempoolError> {
        let hash = tx.hash();
        self.precheck(&tx, &hash)?;

        if let Some(input) = tx.inputs.iter().find(|i| !view.contains(&i.prevout)) {
            return Err(MempoolError::UnresolvedInput(input.prevout));
        }

        services::check_maturity(&view, self.tip_height, self.config.coinbase_maturity)?;
        let fee = services::check_inputs(&tx, &view)?;
        let size = tx.size();
        services::check_policy(&tx, fee, size, &self.config)?;

        if self.total_size + size > self.config.max_size_bytes {
            return Err(VerificationError::policy("mempool full", "pool size limit reached").into());
        }

        let view = view.subset_for(&tx);
        let addresses = collect_addresses(&tx, &view);

        for input in &tx.inputs {
            self.spents.insert(input.prevout, hash);
        }
        for address in &addresses {
            self.by_address.entry(*address).or_default().push(hash);
        }

        let token_data = token_data_for_tx(&tx, hash);
        if !token_data.records.is_empty() {
            self.token_records.insert(hash, token_data.records);
        }
        if let Some(token) = token_data.token {
            self.token_defs.insert(token.token_id.lookup_key(), token);
        }

        self.total_size += size;
        self.by_hash.insert(
            hash,
            MempoolEntry {
                tx,
                hash,
                view,
                fee,
                size,
                added_at: now,
                height: self.tip_height,
                addresses,
            },
        );
        Ok(hash)
    }

    // =========================================================================
    // REMOVAL
    // =========================================================================

    /// Removes a single entry and its index entries. Descendants are kept.
    pub fn remove_entry(&mut self, hash: &Hash) -> Option<MempoolEntry> {
        let entry = self.by_hash.remove(hash)?;

        for input in &entry.tx.inputs {
            if self.spents.get(&input.prevout) == Some(hash) {
                self.spents.remove(&input.prevout);
            }
        }
        for address in &entry.addresses {
            if let Some(history) = self.by_address.get_mut(address) {
                history.retain(|h| h != hash);
                if history.is_empty() {
                    self.by_address.remove(address);
                }
            }
        }
        self.token_records.remove(hash);
        self.token_defs.retain(|_, token| token.token_id.0 != *hash);
        self.total_size = self.total_size.saturating_sub(entry.size);
        Some(entry)
    }

    /// Pool transactions spending outputs of `hash`, transitively.
    pub fn descendants(&self, hash: &Hash) -> Vec<Hash> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*hash]);

        while let Some(current) = queue.pop_front() {
            let Some(entry) = self.by_hash.get(&current) else {
                continue;
            };
            for index in 0..entry.tx.outputs.len() as u32 {
                if let Some(child) = self.spents.get(&OutPoint::new(current, index)) {
                    if seen.insert(*child) {
                        found.push(*child);
                        queue.push_back(*child);
                    }
                }
            }
        }
        found
    }

    /// Removes `hash` and everything that spends its outputs.
    pub fn remove_with_descendants(&mut self, hash: &Hash) -> Vec<Hash> {
        if !self.by_hash.contains_key(hash) {
            return Vec::new();
        }
        let mut removed = vec![*hash];
        removed.extend(self.descendants(hash));
        for h in &removed {
            self.remove_entry(h);
        }
        removed
    }

    /// Applies a newly connected block at `height`.
    ///
    /// Entries the block confirmed leave the pool (their descendants now
    /// spend confirmed outputs and stay). Entries spending an outpoint the
    /// block consumed are double-spent and leave with their descendants.
    pub fn remove_block(&mut self, txs: &[Transaction], height: u32) -> BlockRemoval {
        let mut removal = BlockRemoval::default();

        for tx in txs {
            let hash = tx.hash();
            if self.remove_entry(&hash).is_some() {
                removal.confirmed.push(hash);
                continue;
            }
            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                if let Some(spender) = self.spents.get(&input.prevout).copied() {
                    removal.conflicts.extend(self.remove_with_descendants(&spender));
                }
            }
        }

        self.tip_height = height;
        removal
    }

    /// Outpoints spent by the pool that no pool transaction creates.
    pub fn confirmed_inputs(&self) -> Vec<OutPoint> {
        let mut outpoints: Vec<OutPoint> = self
            .spents
            .keys()
            .filter(|op| !self.by_hash.contains_key(&op.hash))
            .copied()
            .collect();
        outpoints.sort();
        outpoints
    }

    /// Evicts every entry spending one of `missing`, with descendants.
    pub fn evict_spending(&mut self, missing: &HashSet<OutPoint>) -> Vec<Hash> {
        let spenders: Vec<Hash> = missing
            .iter()
            .filter_map(|op| self.spents.get(op).copied())
            .collect();

        let mut evicted = Vec::new();
        for spender in spenders {
            evicted.extend(self.remove_with_descendants(&spender));
        }
        evicted
    }

    /// Drops all state and resumes from `tip_height`.
    pub fn reset(&mut self, tip_height: u32) {
        self.by_hash.clear();
        self.spents.clear();
        self.by_address.clear();
        self.token_records.clear();
        self.token_defs.clear();
        self.total_size = 0;
        self.tip_height = tip_height;
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Unspent output created by a pool transaction.
    pub fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        if self.spents.contains_key(outpoint) {
            return None;
        }
        let entry = self.by_hash.get(&outpoint.hash)?;
        Coin::from_tx(&entry.tx, entry.hash, outpoint.index, UNCONFIRMED_HEIGHT)
    }

    /// Whether a pool transaction spends `outpoint`.
    pub fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.spents.contains_key(outpoint)
    }

    pub fn get_spender(&self, outpoint: &OutPoint) -> Option<Hash> {
        self.spents.get(outpoint).copied()
    }

    /// Unspent pool outputs paying `address`, in admission order.
    pub fn get_coins_by_address(&self, address: &Address) -> Vec<Coin> {
        let Some(history) = self.by_address.get(address) else {
            return Vec::new();
        };
        let mut coins = Vec::new();
        for hash in history {
            let Some(entry) = self.by_hash.get(hash) else {
                continue;
            };
            for (index, output) in entry.tx.outputs.iter().enumerate() {
                if output.address().as_ref() != Some(address) {
                    continue;
                }
                let outpoint = OutPoint::new(*hash, index as u32);
                if self.spents.contains_key(&outpoint) {
                    continue;
                }
                if let Some(coin) = Coin::from_tx(&entry.tx, *hash, index as u32, UNCONFIRMED_HEIGHT) {
                    coins.push(coin);
                }
            }
        }
        coins
    }

    pub fn get_meta(&self, hash: &Hash) -> Option<TxMeta> {
        self.by_hash.get(hash).map(MempoolEntry::meta)
    }

    pub fn get_hashes_by_address(&self, address: &Address, query: &AddressQuery) -> Vec<Hash> {
        match self.by_address.get(address) {
            Some(history) => query.page(history, HistorySegment::Pending),
            None => Vec::new(),
        }
    }

    pub fn get_metas_by_address(&self, address: &Address, query: &AddressQuery) -> Vec<TxMeta> {
        self.get_hashes_by_address(address, query)
            .iter()
            .filter_map(|hash| self.get_meta(hash))
            .collect()
    }

    /// Coins consumed by `tx` as far as the pool knows them.
    pub fn get_spent_view(&self, tx: &Transaction) -> CoinView {
        if let Some(entry) = self.by_hash.get(&tx.hash()) {
            return entry.view.clone();
        }
        tx.inputs
            .iter()
            .filter_map(|input| {
                let parent = self.by_hash.get(&input.prevout.hash)?;
                Coin::from_tx(&parent.tx, parent.hash, input.prevout.index, UNCONFIRMED_HEIGHT)
            })
            .collect()
    }

    pub fn get_tx_token_records(&self, hash: &Hash) -> Vec<CoinTokenRecord> {
        self.token_records.get(hash).cloned().unwrap_or_default()
    }

    pub fn get_coin_token_record(&self, outpoint: &OutPoint) -> Option<CoinTokenRecord> {
        self.token_records
            .get(&outpoint.hash)?
            .iter()
            .find(|record| record.outpoint == *outpoint)
            .cloned()
    }

    /// Descriptive record by `TokenId::lookup_key`.
    pub fn get_token_record(&self, key: &Hash) -> Option<TokenRecord> {
        self.token_defs.get(key).cloned()
    }

    pub fn status(&self) -> MempoolStatus {
        MempoolStatus {
            tx_count: self.by_hash.len(),
            total_size: self.total_size,
            spent_outpoints: self.spents.len(),
            tracked_addresses: self.by_address.len(),
            tip_height: self.tip_height,
        }
    }
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn collect_addresses(tx: &Transaction, view: &CoinView) -> Vec<Address> {
    let mut seen = HashSet::new();
    let inputs = tx
        .inputs
        .iter()
        .filter_map(|input| view.get(&input.prevout).and_then(Coin::address));
    let outputs = tx.outputs.iter().filter_map(|output| output.address());
    inputs.chain(outputs).filter(|a| seen.insert(*a)).collect()
}
