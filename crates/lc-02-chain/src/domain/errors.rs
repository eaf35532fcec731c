//! # Domain Errors
//!
//! Error types for the chain collaborator. Every failing operation leaves
//! the chain exactly as it was.

use shared_types::{display_hash, Hash, OutPoint};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("block not found: {}", display_hash(.hash))]
    BlockNotFound { hash: Hash },

    #[error("no main-chain block at height {height}")]
    HeightNotFound { height: u32 },

    #[error("block already on the main chain: {}", display_hash(.hash))]
    BlockExists { hash: Hash },

    #[error("parent block not found: {}", display_hash(.parent_hash))]
    ParentNotFound { parent_hash: Hash },

    /// The block's parent is known but is not the current tip.
    #[error("block does not extend the tip: parent {}, tip {}", display_hash(.parent_hash), display_hash(.tip))]
    NotExtendingTip { parent_hash: Hash, tip: Hash },

    #[error("fork point is not on the main chain: {}", display_hash(.hash))]
    ForkNotOnMainChain { hash: Hash },

    /// An input references a coin the chain does not hold.
    #[error("missing or spent input {outpoint}")]
    MissingInput { outpoint: OutPoint },

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("genesis block cannot be disconnected")]
    GenesisImmutable,

    /// Undo data for a main-chain block is gone.
    #[error("undo data missing for block {}", display_hash(.hash))]
    UndoMissing { hash: Hash },
}
