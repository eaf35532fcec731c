//! # Domain Layer - Mempool Subsystem
//!
//! ## Components
//!
//! - `entities`: MempoolEntry, MempoolConfig
//! - `pool`: TransactionPool with spent-outpoint, address and token indexes
//! - `services`: sanity, input, maturity and relay-policy checks
//! - `value_objects`: InputResolution, BlockRemoval, MempoolStatus
//! - `errors`: MempoolError enumeration

pub mod entities;
pub mod errors;
pub mod pool;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use pool::*;
pub use services::*;
pub use value_objects::*;
