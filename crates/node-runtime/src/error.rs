//! # Node Errors
//!
//! One error type for every port and service of the node core.

use lc_01_mempool::MempoolError;
use lc_02_chain::ChainError;
use lc_03_indexing::IndexError;
use shared_types::VerificationError;
use thiserror::Error;

use crate::container::ConfigError;

#[derive(Debug, Error)]
pub enum NodeError {
    /// A transaction broke a policy (score 0) or consensus rule.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Mempool(MempoolError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("relay error: {0}")]
    Relay(String),

    /// Collaborators disagree in a way that should be impossible.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("{0} is disabled")]
    Disabled(&'static str),

    #[error("reconciler is not running")]
    ReconcilerStopped,
}

impl From<MempoolError> for NodeError {
    fn from(err: MempoolError) -> Self {
        match err {
            MempoolError::Verification(err) => NodeError::Verification(err),
            other => NodeError::Mempool(other),
        }
    }
}

impl NodeError {
    /// The verification failure carried by this error, if any.
    pub fn verification(&self) -> Option<&VerificationError> {
        match self {
            NodeError::Verification(err) => Some(err),
            _ => None,
        }
    }
}
