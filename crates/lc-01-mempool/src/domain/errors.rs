//! Mempool error types.

use super::entities::{Hash, OutPoint};
use shared_types::{display_hash, VerificationError};
use thiserror::Error;

/// Mempool error type.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MempoolError {
    /// The transaction broke a policy or consensus rule.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// `add` was called without a coin for every input.
    #[error("unresolved input {0}")]
    UnresolvedInput(OutPoint),

    /// Transaction not found in the pool.
    #[error("transaction not found: {}", display_hash(.0))]
    TransactionNotFound(Hash),

    /// A collaborator the pool depends on failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl MempoolError {
    /// The verification failure carried by this error, if any.
    pub fn verification(&self) -> Option<&VerificationError> {
        match self {
            MempoolError::Verification(err) => Some(err),
            _ => None,
        }
    }
}
