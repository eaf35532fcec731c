//! # Genesis Block Builder

use shared_types::{Address, Block, OutPoint, Transaction, TxInput, TxOutput, NULL_HASH};

/// Coinbase value of the development genesis block.
pub const GENESIS_REWARD: u64 = 50 * 100_000_000;

/// Genesis block configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisConfig {
    /// Public key hash the genesis coinbase pays.
    pub payout: [u8; 20],

    /// Genesis timestamp (Unix seconds).
    pub time: u64,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            payout: [0u8; 20],
            time: 1_600_000_000,
        }
    }
}

impl GenesisConfig {
    pub fn payout_address(&self) -> Address {
        Address::pubkey_hash(self.payout)
    }
}

/// Builder for creating genesis blocks.
pub struct GenesisBuilder {
    config: GenesisConfig,
    reward: u64,
    message: Vec<u8>,
}

impl GenesisBuilder {
    pub fn new(config: GenesisConfig) -> Self {
        Self {
            config,
            reward: GENESIS_REWARD,
            message: b"ledger-node genesis".to_vec(),
        }
    }

    pub fn reward(mut self, reward: u64) -> Self {
        self.reward = reward;
        self
    }

    /// Free-form bytes carried in the coinbase input script.
    pub fn message(mut self, message: impl Into<Vec<u8>>) -> Self {
        self.message = message.into();
        self
    }

    pub fn build(self) -> Block {
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxInput {
                prevout: OutPoint::null(),
                script: self.message,
                sequence: u32::MAX,
            }],
            outputs: vec![TxOutput::new(
                self.reward,
                self.config.payout_address().to_script(),
            )],
            lock_time: 0,
        };
        Block::new(NULL_HASH, self.config.time, 0, vec![coinbase])
    }
}

/// Genesis block for development and test networks.
pub fn dev_genesis(config: &GenesisConfig) -> Block {
    GenesisBuilder::new(config.clone()).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_pays_configured_address() {
        let config = GenesisConfig {
            payout: [7; 20],
            time: 1_700_000_000,
        };
        let genesis = dev_genesis(&config);

        assert_eq!(genesis.prev_hash(), NULL_HASH);
        assert_eq!(genesis.header.time, 1_700_000_000);
        assert_eq!(genesis.txs.len(), 1);
        assert!(genesis.txs[0].is_coinbase());
        assert_eq!(genesis.txs[0].outputs[0].value, GENESIS_REWARD);
        assert_eq!(
            genesis.txs[0].outputs[0].address(),
            Some(Address::pubkey_hash([7; 20]))
        );
    }

    #[test]
    fn test_genesis_hash_deterministic() {
        let config = GenesisConfig::default();
        assert_eq!(dev_genesis(&config).hash(), dev_genesis(&config).hash());

        let other = GenesisBuilder::new(config.clone()).message("other").build();
        assert_ne!(other.hash(), dev_genesis(&config).hash());
    }
}
