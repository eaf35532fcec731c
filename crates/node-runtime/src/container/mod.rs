//! # Subsystem Container
//!
//! Wires the chain, the pool, the optional indexes and the network-facing
//! collaborators into the set of ports the node core consumes.

use std::sync::Arc;

use crate::ports::{
    AddrIndexPort, ChainPort, MempoolPort, MinerPort, RelayPort, TokenIndexPort, TxIndexPort,
};

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig};
pub use subsystems::SubsystemContainer;

/// Everything the node core talks to. Disabled indexes are `None`.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainPort>,
    pub mempool: Arc<dyn MempoolPort>,
    pub tx_index: Option<Arc<dyn TxIndexPort>>,
    pub addr_index: Option<Arc<dyn AddrIndexPort>>,
    pub token_index: Option<Arc<dyn TokenIndexPort>>,
    pub relay: Arc<dyn RelayPort>,
    pub miner: Arc<dyn MinerPort>,
}
