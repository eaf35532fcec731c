//! # Chain Collaborator (lc-02)
//!
//! In-memory confirmed ledger: the main chain of entries, the blocks behind
//! them, the unspent-output set and the undo data needed to disconnect.
//! It performs no consensus validation beyond structural integrity (inputs
//! must exist, the block must extend the tip).
//!
//! ## Lifecycle Events
//!
//! Every mutation returns the [`ChainEvent`]s describing it, after the state
//! change has been applied:
//!
//! ```text
//! connect(block)                 → [Connect]
//! disconnect_tip()               → [Disconnect]
//! reorganize(fork, blocks)       → [Disconnect.., Connect.., Reorganize]
//! reset(height)                  → [Reset]
//! ```
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Sequential Blocks | A block must extend the current tip |
//! | 2 | Atomic Connect | A failing block leaves coins and tip untouched |
//! | 3 | Genesis Immutability | The genesis block is never disconnected |
//! | 4 | Reversible | Disconnect restores exactly the coins the block spent |

pub mod domain;

pub use domain::{ChainError, ChainStore};
pub use shared_bus::ChainEvent;
