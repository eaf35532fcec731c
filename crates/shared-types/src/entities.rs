//! # Core Ledger Entities
//!
//! Transactions, blocks, chain entries, coins and the metadata that binds a
//! transaction to its confirmation context.

use crate::token::{CoinTokenRecord, TxTokenOverlay};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// A 32-byte hash (double SHA-256), stored in internal byte order.
pub type Hash = [u8; 32];

/// The all-zero hash referenced by coinbase inputs.
pub const NULL_HASH: Hash = [0u8; 32];

/// Height reported by unconfirmed metadata and pool coins.
pub const UNCONFIRMED_HEIGHT: i64 = -1;

/// Double SHA-256 of `data`.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Hex rendering of a hash in display (reversed) byte order.
pub fn display_hash(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Reference to a single transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The outpoint referenced by a coinbase input.
    pub fn null() -> Self {
        Self {
            hash: NULL_HASH,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == NULL_HASH && self.index == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", display_hash(&self.hash), self.index)
    }
}

/// Standard locking-script families an address can be derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressKind {
    PubKeyHash,
    ScriptHash,
}

/// A payment address: a script family plus a 20-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub kind: AddressKind,
    pub hash: [u8; 20],
}

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
pub(crate) const OP_RETURN: u8 = 0x6a;

impl Address {
    pub fn pubkey_hash(hash: [u8; 20]) -> Self {
        Self {
            kind: AddressKind::PubKeyHash,
            hash,
        }
    }

    pub fn script_hash(hash: [u8; 20]) -> Self {
        Self {
            kind: AddressKind::ScriptHash,
            hash,
        }
    }

    /// Extracts the address paid by a standard P2PKH or P2SH locking script.
    pub fn from_script(script: &[u8]) -> Option<Self> {
        match script {
            [OP_DUP, OP_HASH160, 20, body @ .., OP_EQUALVERIFY, OP_CHECKSIG] if body.len() == 20 => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(body);
                Some(Self::pubkey_hash(hash))
            }
            [OP_HASH160, 20, body @ .., OP_EQUAL] if body.len() == 20 => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(body);
                Some(Self::script_hash(hash))
            }
            _ => None,
        }
    }

    /// Builds the standard locking script paying this address.
    pub fn to_script(&self) -> Vec<u8> {
        match self.kind {
            AddressKind::PubKeyHash => {
                let mut script = vec![OP_DUP, OP_HASH160, 20];
                script.extend_from_slice(&self.hash);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                script
            }
            AddressKind::ScriptHash => {
                let mut script = vec![OP_HASH160, 20];
                script.extend_from_slice(&self.hash);
                script.push(OP_EQUAL);
                script
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            AddressKind::PubKeyHash => "pkh",
            AddressKind::ScriptHash => "sh",
        };
        write!(f, "{}:{}", prefix, hex::encode(self.hash))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub script: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script: Vec<u8>) -> Self {
        Self { value, script }
    }

    pub fn address(&self) -> Option<Address> {
        Address::from_script(&self.script)
    }

    /// Provably unspendable data carrier output.
    pub fn is_null_data(&self) -> bool {
        self.script.first() == Some(&OP_RETURN)
    }
}

/// An immutable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Content hash: double SHA-256 of the canonical encoding.
    pub fn hash(&self) -> Hash {
        sha256d(&self.encode())
    }

    /// A single input spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        self.encode().len()
    }

    pub fn output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }

    /// Canonical little-endian encoding with compact-size length prefixes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + self.inputs.len() * 48 + self.outputs.len() * 34);
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.prevout.hash);
            buf.extend_from_slice(&input.prevout.index.to_le_bytes());
            write_compact_size(&mut buf, input.script.len() as u64);
            buf.extend_from_slice(&input.script);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_compact_size(&mut buf, output.script.len() as u64);
            buf.extend_from_slice(&output.script);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }
}

fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => buf.push(n as u8),
        0xfd..=0xffff => {
            buf.push(0xfd);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            buf.push(0xfe);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xff);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub time: u64,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(84);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.prev_hash);
        buf.extend_from_slice(&self.merkle_root);
        buf.extend_from_slice(&self.time.to_le_bytes());
        buf.extend_from_slice(&self.bits.to_le_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        sha256d(&buf)
    }
}

/// A block: header plus its ordered transactions (coinbase first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    /// Assembles a block, committing to `txs` through the merkle root.
    pub fn new(prev_hash: Hash, time: u64, nonce: u32, txs: Vec<Transaction>) -> Self {
        let hashes: Vec<Hash> = txs.iter().map(Transaction::hash).collect();
        Self {
            header: BlockHeader {
                version: 1,
                prev_hash,
                merkle_root: merkle_root(&hashes),
                time,
                bits: 0x207f_ffff,
                nonce,
            },
            txs,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn prev_hash(&self) -> Hash {
        self.header.prev_hash
    }
}

/// Bitcoin-style merkle root: odd levels duplicate their last hash.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return NULL_HASH;
    }
    let mut level = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(last) = level.last().copied() {
                level.push(last);
            }
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(&pair[1]);
                sha256d(&buf)
            })
            .collect();
    }
    level[0]
}

/// Immutable header metadata of a block on the main chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub height: u32,
    pub time: u64,
    /// Cumulative work up to and including this block.
    pub chainwork: u128,
}

impl ChainEntry {
    /// Entry for `block` extending `prev` (or the genesis entry when `prev` is `None`).
    pub fn from_block(block: &Block, prev: Option<&ChainEntry>) -> Self {
        let (height, prev_work) = match prev {
            Some(p) => (p.height + 1, p.chainwork),
            None => (0, 0),
        };
        Self {
            hash: block.hash(),
            prev_hash: block.prev_hash(),
            height,
            time: block.header.time,
            chainwork: prev_work + block_work(block.header.bits),
        }
    }
}

/// Expected work for a compact difficulty target. Coarse, but monotonic in difficulty.
fn block_work(bits: u32) -> u128 {
    let exponent = bits >> 24;
    let shift = 256u32.saturating_sub(8 * exponent).min(127);
    (1u128 << shift).max(1)
}

/// An unspent output together with its confirmation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub value: u64,
    pub script: Vec<u8>,
    /// Confirmation height, or [`UNCONFIRMED_HEIGHT`] for pool coins.
    pub height: i64,
    pub coinbase: bool,
    /// Token record attached by the overlay, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<CoinTokenRecord>,
}

impl Coin {
    /// Coin for output `index` of `tx` at `height`.
    pub fn from_tx(tx: &Transaction, hash: Hash, index: u32, height: i64) -> Option<Self> {
        let output = tx.outputs.get(index as usize)?;
        Some(Self {
            outpoint: OutPoint::new(hash, index),
            value: output.value,
            script: output.script.clone(),
            height,
            coinbase: tx.is_coinbase(),
            token: None,
        })
    }

    pub fn address(&self) -> Option<Address> {
        Address::from_script(&self.script)
    }
}

/// Set of coins consumed as inputs, keyed by outpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinView {
    coins: HashMap<OutPoint, Coin>,
}

impl CoinView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, coin: Coin) {
        self.coins.insert(coin.outpoint, coin);
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.coins.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.coins.values()
    }

    /// Sum of input values, `None` when an input is missing or the sum overflows.
    pub fn input_value(&self, tx: &Transaction) -> Option<u64> {
        tx.inputs.iter().try_fold(0u64, |acc, input| {
            let coin = self.coins.get(&input.prevout)?;
            acc.checked_add(coin.value)
        })
    }

    /// The subset of this view consumed by `tx`.
    pub fn subset_for(&self, tx: &Transaction) -> CoinView {
        let coins = tx
            .inputs
            .iter()
            .filter_map(|input| self.coins.get(&input.prevout))
            .map(|coin| (coin.outpoint, coin.clone()))
            .collect();
        CoinView { coins }
    }
}

impl FromIterator<Coin> for CoinView {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        Self {
            coins: iter.into_iter().map(|c| (c.outpoint, c)).collect(),
        }
    }
}

/// A transaction plus its confirmation context.
///
/// Built only through [`TxMeta::unconfirmed`] and [`TxMeta::confirmed`], so the
/// height is always `-1` for pool metadata and non-negative otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxMeta {
    pub tx: Transaction,
    pub hash: Hash,
    pub height: i64,
    pub block: Option<Hash>,
    /// Block time, zero while unconfirmed.
    pub time: u64,
    /// Position within the block.
    pub index: Option<u32>,
    /// Time the transaction was first seen.
    pub mtime: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TxTokenOverlay>,
}

impl TxMeta {
    pub fn unconfirmed(tx: Transaction, mtime: u64) -> Self {
        Self {
            hash: tx.hash(),
            tx,
            height: UNCONFIRMED_HEIGHT,
            block: None,
            time: 0,
            index: None,
            mtime,
            token: None,
        }
    }

    pub fn confirmed(tx: Transaction, entry: &ChainEntry, index: u32) -> Self {
        Self {
            hash: tx.hash(),
            tx,
            height: i64::from(entry.height),
            block: Some(entry.hash),
            time: entry.time,
            index: Some(index),
            mtime: entry.time,
            token: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.height >= 0
    }
}

/// A bare transaction with the optional token overlay attached by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedTx {
    pub tx: Transaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TxTokenOverlay>,
}

impl From<Transaction> for AnnotatedTx {
    fn from(tx: Transaction) -> Self {
        Self { tx, token: None }
    }
}

/// Item handed to the relay collaborator for broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryItem {
    Tx(Transaction),
    Block(Block),
}

impl InventoryItem {
    pub fn hash(&self) -> Hash {
        match self {
            InventoryItem::Tx(tx) => tx.hash(),
            InventoryItem::Block(block) => block.hash(),
        }
    }
}
