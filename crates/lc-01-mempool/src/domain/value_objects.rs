//! Value objects for the Mempool subsystem.

use super::entities::{CoinView, Hash, OutPoint};

/// Inputs of a candidate transaction, split by where their coins live.
#[derive(Clone, Debug, Default)]
pub struct InputResolution {
    /// Coins created by pool transactions.
    pub view: CoinView,
    /// Outpoints the pool does not know; they must come from confirmed state.
    pub unresolved: Vec<OutPoint>,
}

/// What a connected block removed from the pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockRemoval {
    /// Pool transactions the block confirmed.
    pub confirmed: Vec<Hash>,
    /// Pool transactions (and descendants) double-spent by the block.
    pub conflicts: Vec<Hash>,
}

impl BlockRemoval {
    pub fn total(&self) -> usize {
        self.confirmed.len() + self.conflicts.len()
    }
}

/// Mempool status snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MempoolStatus {
    pub tx_count: usize,
    pub total_size: usize,
    pub spent_outpoints: usize,
    pub tracked_addresses: usize,
    pub tip_height: u32,
}
