//! # Domain Layer - Chain
//!
//! - `chain`: ChainStore (main chain, block store, unspent set, undo data)
//! - `errors`: ChainError

pub mod chain;
pub mod errors;

pub use chain::ChainStore;
pub use errors::ChainError;
