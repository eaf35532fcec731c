//! # Error Types
//!
//! Errors shared by every subsystem that checks transactions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ban score of a rule violation that no honest peer would relay.
pub const CONSENSUS_SCORE: u32 = 100;

/// A transaction failed verification.
///
/// `score == 0` marks a local policy rejection; anything higher is a
/// consensus-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("verification failed: {reason} ({code}, score {score})")]
pub struct VerificationError {
    pub code: String,
    pub reason: String,
    pub score: u32,
}

impl VerificationError {
    pub fn policy(code: &str, reason: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            reason: reason.into(),
            score: 0,
        }
    }

    pub fn consensus(code: &str, reason: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            reason: reason.into(),
            score: CONSENSUS_SCORE,
        }
    }

    pub fn is_policy(&self) -> bool {
        self.score == 0
    }
}
