//! # Domain Layer - Indexing
//!
//! - `indexer`: the `BlockIndexer` synchronization contract
//! - `tx_index`: confirmed metadata and spent views by hash
//! - `addr_index`: per-address history and unspent coins
//! - `token_index`: per-output token records
//! - `errors`: IndexError

pub mod addr_index;
pub mod errors;
pub mod indexer;
pub mod token_index;
pub mod tx_index;

pub use addr_index::{AddrIndex, DEFAULT_MAX_TXS};
pub use errors::IndexError;
pub use indexer::BlockIndexer;
pub use token_index::TokenIndex;
pub use tx_index::TxIndex;
