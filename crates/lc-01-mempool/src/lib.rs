//! # Pending Transaction Pool (Mempool) Subsystem
//!
//! **Subsystem ID:** lc-01
//!
//! ## Purpose
//!
//! Holds unconfirmed transactions on top of the confirmed tip and acts as a
//! virtual unspent-output layer: pool outputs are coins, outpoints spent by
//! pool transactions are suppressed.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | No duplicate transactions | `TransactionPool::precheck` |
//! | At most one pool spender per outpoint | `TransactionPool::precheck` (`spents`) |
//! | Removing an entry whose outputs vanish removes its descendants | `TransactionPool::remove_with_descendants` |
//! | Pool metadata is always unconfirmed (height -1) | `MempoolEntry::meta` |
//!
//! ## Chain Synchronization
//!
//! ```text
//! connect(block)    ──→ remove_block()      confirmed + double-spent entries leave
//! disconnect(block) ──→ add() per tx        best-effort re-admission
//! reorganize        ──→ evict_spending()    entries with vanished inputs leave
//! reset             ──→ reset()             everything leaves
//! ```
//!
//! ## Rejection Scores
//!
//! Shape violations (no inputs, duplicate inputs, value overflow, inputs
//! below outputs, standalone coinbase) carry score 100. Local policy
//! (duplicates, conflicts, dust, fee rate, pool size, coinbase maturity)
//! carries score 0.

#![warn(missing_debug_implementations)]

pub mod domain;
pub mod ports;

pub use domain::{
    BlockRemoval, InputResolution, MempoolConfig, MempoolEntry, MempoolError, MempoolStatus,
    Timestamp, TransactionPool,
};
pub use ports::{FixedTimeSource, SystemTimeSource, TimeSource};
