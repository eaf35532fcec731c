//! # Miner Adapters
//!
//! Block production lives outside the node core; it only hears about
//! accepted transactions.

use parking_lot::Mutex;
use shared_types::{display_hash, Hash, Transaction};
use tracing::trace;

use crate::ports::MinerPort;

#[derive(Debug, Default)]
pub struct NoOpMiner;

impl MinerPort for NoOpMiner {
    fn notify_entry(&self, tx: &Transaction) {
        trace!(tx = %display_hash(&tx.hash()), "[miner] Entry ignored");
    }
}

/// Remembers the hash of every notified transaction.
#[derive(Debug, Default)]
pub struct RecordingMiner {
    entries: Mutex<Vec<Hash>>,
}

impl RecordingMiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Hash> {
        self.entries.lock().clone()
    }
}

impl MinerPort for RecordingMiner {
    fn notify_entry(&self, tx: &Transaction) {
        self.entries.lock().push(tx.hash());
    }
}
