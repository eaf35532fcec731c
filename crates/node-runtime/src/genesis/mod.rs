//! # Genesis Module
//!
//! Development genesis block for nodes started without a persisted chain.
//!
//! The genesis block holds a single coinbase paying the configured address.
//! Its hash, and so every later block hash, depends only on the payout
//! address and the timestamp.

pub mod builder;

pub use builder::{dev_genesis, GenesisBuilder, GenesisConfig, GENESIS_REWARD};
