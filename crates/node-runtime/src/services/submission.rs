//! # Submission Path
//!
//! ```text
//! send_tx ──→ pool ──┬─ accepted ────────→ Ok (selfish: broadcast)
//!                    ├─ orphan ──────────→ broadcast, Ok
//!                    ├─ score 0 ─────────→ report; relay_unverified ? broadcast, Ok : Err
//!                    └─ score > 0 / fault → Err, no broadcast
//! ```
//!
//! Broadcast failures never fail a submission; they go to the error channel.

use std::sync::Arc;

use shared_bus::EventSource;
use shared_types::{display_hash, Hash, InventoryItem, Transaction};
use tracing::{info, warn};

use crate::error::NodeError;
use crate::ports::{AddOutcome, MempoolPort, RelayPort};
use crate::reporting::ErrorReporter;

/// How a submission ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Accepted(Hash),
    /// Parents unknown; broadcast anyway.
    Orphan { hash: Hash, missing: Vec<Hash> },
    /// Rejected by local policy and broadcast anyway.
    RelayedUnverified(Hash),
}

#[derive(Clone)]
pub struct SubmissionService {
    mempool: Arc<dyn MempoolPort>,
    relay: Arc<dyn RelayPort>,
    reporter: ErrorReporter,
    selfish: bool,
}

impl SubmissionService {
    pub fn new(
        mempool: Arc<dyn MempoolPort>,
        relay: Arc<dyn RelayPort>,
        reporter: ErrorReporter,
        selfish: bool,
    ) -> Self {
        Self {
            mempool,
            relay,
            reporter,
            selfish,
        }
    }

    pub async fn send_tx(&self, tx: Transaction, relay_unverified: bool) -> Result<Submitted, NodeError> {
        let hash = tx.hash();
        match self.mempool.add_tx(tx.clone()).await {
            Ok(AddOutcome::Accepted(hash)) => {
                if self.selfish {
                    self.broadcast_best_effort(tx).await;
                }
                Ok(Submitted::Accepted(hash))
            }
            Ok(AddOutcome::Orphan { missing }) => {
                info!(
                    tx = %display_hash(&hash),
                    missing = missing.len(),
                    "[submit] Orphan transaction, broadcasting anyway"
                );
                self.broadcast_best_effort(tx).await;
                Ok(Submitted::Orphan { hash, missing })
            }
            Err(NodeError::Verification(err)) if err.is_policy() => {
                self.reporter
                    .report(EventSource::Submission, "send_tx", &err)
                    .await;
                warn!(tx = %display_hash(&hash), code = %err.code, "[submit] Verification failed");
                if !relay_unverified {
                    return Err(NodeError::Verification(err));
                }
                warn!(tx = %display_hash(&hash), "[submit] Attempting to broadcast anyway");
                self.broadcast_best_effort(tx).await;
                Ok(Submitted::RelayedUnverified(hash))
            }
            Err(err) => Err(err),
        }
    }

    /// Like [`send_tx`](Self::send_tx), but every failure goes to the error
    /// channel instead of the caller.
    pub async fn relay(&self, tx: Transaction) {
        if let Err(err) = self.send_tx(tx, true).await {
            self.reporter
                .report(EventSource::Submission, "relay", &err)
                .await;
        }
    }

    pub async fn broadcast(&self, item: InventoryItem) -> Result<(), NodeError> {
        self.relay.broadcast(item).await
    }

    async fn broadcast_best_effort(&self, tx: Transaction) {
        if let Err(err) = self.relay.broadcast(InventoryItem::Tx(tx)).await {
            self.reporter
                .report(EventSource::Submission, "broadcast", &err)
                .await;
        }
    }
}
