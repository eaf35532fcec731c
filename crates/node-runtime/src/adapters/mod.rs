//! # Adapter Implementations
//!
//! Concrete implementations of the outbound ports in [`crate::ports`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  ChainAdapter  MempoolAdapter  IndexAdapter<I>  Relay / Miner    │
//! │                   ↑ implements ↑                                 │
//! │  ChainPort  MempoolPort  TxIndexPort  AddrIndexPort  ...         │
//! │                   ↑ uses ↑                                       │
//! │  Reconciler, QueryService, TokenOverlay, SubmissionService       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod chain;
pub mod indexing;
pub mod mempool;
pub mod miner;
pub mod relay;

pub use chain::ChainAdapter;
pub use indexing::{AddrIndexAdapter, IndexAdapter, TokenIndexAdapter, TxIndexAdapter};
pub use mempool::MempoolAdapter;
pub use miner::{NoOpMiner, RecordingMiner};
pub use relay::{LoggingRelay, RecordingRelay};
