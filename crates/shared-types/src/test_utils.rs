//! Fixture builders for tests across the workspace.

use crate::entities::{
    Address, Block, ChainEntry, OutPoint, Transaction, TxInput, TxOutput, NULL_HASH,
};

pub const COINBASE_VALUE: u64 = 50 * 100_000_000;
pub const GENESIS_TIME: u64 = 1_600_000_000;
/// Fee that comfortably clears the default relay fee for fixture transactions.
pub const FIXTURE_FEE: u64 = 10_000;

pub fn address(n: u8) -> Address {
    Address::pubkey_hash([n; 20])
}

/// Coinbase paying `value` to `to`; the height keeps coinbase hashes unique.
pub fn coinbase(height: u32, to: &Address, value: u64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            prevout: OutPoint::null(),
            script: height.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutput::new(value, to.to_script())],
        lock_time: 0,
    }
}

pub fn spend(inputs: &[OutPoint], outputs: &[(Address, u64)]) -> Transaction {
    Transaction {
        version: 1,
        inputs: inputs
            .iter()
            .map(|prevout| TxInput {
                prevout: *prevout,
                script: vec![0x51],
                sequence: u32::MAX,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|(addr, value)| TxOutput::new(*value, addr.to_script()))
            .collect(),
        lock_time: 0,
    }
}

/// Spends `prevout` worth `value` to `to`, paying [`FIXTURE_FEE`].
pub fn pay(prevout: OutPoint, value: u64, to: &Address) -> Transaction {
    spend(&[prevout], &[(*to, value - FIXTURE_FEE)])
}

pub fn genesis_block(miner: &Address) -> Block {
    Block::new(NULL_HASH, GENESIS_TIME, 0, vec![coinbase(0, miner, COINBASE_VALUE)])
}

/// Block on top of `prev` with a fresh coinbase followed by `txs`.
pub fn next_block(prev: &ChainEntry, miner: &Address, txs: Vec<Transaction>) -> Block {
    next_block_with_nonce(prev, miner, txs, 0)
}

/// Like [`next_block`], but `nonce` distinguishes competing siblings.
pub fn next_block_with_nonce(
    prev: &ChainEntry,
    miner: &Address,
    txs: Vec<Transaction>,
    nonce: u32,
) -> Block {
    let height = prev.height + 1;
    let mut all = vec![coinbase(height, miner, COINBASE_VALUE + u64::from(nonce))];
    all.extend(txs);
    Block::new(prev.hash, prev.time + 600, nonce, all)
}
