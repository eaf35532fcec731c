//! Core entities for the Mempool subsystem.

pub use shared_types::{
    Address, Coin, CoinTokenRecord, CoinView, Hash, OutPoint, TokenRecord, Transaction, TxMeta,
};

/// Timestamp in seconds since the Unix epoch.
pub type Timestamp = u64;

/// A transaction admitted to the pool, with everything needed to evict it again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub hash: Hash,
    /// Coins consumed by the inputs at admission time.
    pub view: CoinView,
    pub fee: u64,
    pub size: usize,
    pub added_at: Timestamp,
    /// Tip height when the entry was admitted.
    pub height: u32,
    /// Addresses the entry was indexed under.
    pub addresses: Vec<Address>,
}

impl MempoolEntry {
    /// Fee per kilobyte, rounded down.
    pub fn fee_rate(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.fee.saturating_mul(1000) / self.size as u64
    }

    pub fn meta(&self) -> TxMeta {
        TxMeta::unconfirmed(self.tx.clone(), self.added_at)
    }
}

/// Mempool configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MempoolConfig {
    /// Maximum total serialized size of pooled transactions, in bytes.
    pub max_size_bytes: usize,
    /// Minimum relay fee, in base units per 1000 bytes.
    pub min_relay_fee: u64,
    /// Outputs below this value are rejected as dust.
    pub dust_threshold: u64,
    /// Confirmations a coinbase output needs before the pool accepts a spend.
    pub coinbase_maturity: u32,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 100 * 1024 * 1024,
            min_relay_fee: 1000,
            dust_threshold: 546,
            coinbase_maturity: 100,
        }
    }
}

impl MempoolConfig {
    /// Creates a permissive config for testing: coinbase outputs are spendable immediately.
    pub fn for_testing() -> Self {
        Self {
            max_size_bytes: 1024 * 1024,
            coinbase_maturity: 0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rate() {
        let entry = MempoolEntry {
            tx: Transaction {
                version: 1,
                inputs: vec![],
                outputs: vec![],
                lock_time: 0,
            },
            hash: [0; 32],
            view: CoinView::new(),
            fee: 250,
            size: 250,
            added_at: 0,
            height: 0,
            addresses: vec![],
        };
        assert_eq!(entry.fee_rate(), 1000);
    }

    #[test]
    fn test_testing_config_matures_coinbase_immediately() {
        assert_eq!(MempoolConfig::for_testing().coinbase_maturity, 0);
        assert_eq!(MempoolConfig::default().coinbase_maturity, 100);
    }
}
