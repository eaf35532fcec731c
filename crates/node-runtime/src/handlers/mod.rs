//! # Handlers
//!
//! Long-running tasks that react to collaborator signals.

pub mod reconciler;
pub mod tx_forwarder;

pub use reconciler::{Reconciler, ReconcilerHandle, ReconcilerMessage, StartedReconciler};
pub use tx_forwarder::TxForwarder;
