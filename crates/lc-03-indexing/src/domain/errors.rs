//! # Domain Errors
//!
//! Error types for the indexing subsystem.

use thiserror::Error;

/// Errors that can occur during indexing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// A history query asked for more results than the index serves at once.
    #[error("limit {requested} exceeds maximum of {max}")]
    LimitExceeded { requested: usize, max: usize },

    /// Blocks must be indexed in height order without gaps.
    #[error("{index}: expected block at height {expected}, got {actual}")]
    HeightMismatch {
        index: &'static str,
        expected: u32,
        actual: u32,
    },

    /// The block handed to `unindex` is not the index tip.
    #[error("{index}: block at height {height} is not the indexed tip")]
    NotIndexedTip { index: &'static str, height: u32 },

    /// Backing storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}
