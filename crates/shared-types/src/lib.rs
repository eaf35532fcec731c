//! # Shared Types Crate
//!
//! Ledger entities, token metadata and query options shared by the pool,
//! the chain, the indexes and the node core.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type crossing a crate boundary lives here.
//! - **Immutable values**: transactions, blocks and chain entries are never
//!   mutated once built; hashes are computed from their canonical encoding.

pub mod entities;
pub mod errors;
pub mod query;
pub mod token;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use entities::*;
pub use errors::*;
pub use query::*;
pub use token::*;
