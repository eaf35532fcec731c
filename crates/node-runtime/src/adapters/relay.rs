//! # Relay Adapters
//!
//! The node ships without a peer-to-peer stack. [`LoggingRelay`] stands in
//! for it in the dev binary; [`RecordingRelay`] captures broadcasts.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{display_hash, InventoryItem};
use tracing::info;

use crate::error::NodeError;
use crate::ports::RelayPort;

/// Logs what a real relay would announce.
#[derive(Debug, Default)]
pub struct LoggingRelay {
    connected: AtomicBool,
    syncing: AtomicBool,
}

impl LoggingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayPort for LoggingRelay {
    async fn broadcast(&self, item: InventoryItem) -> Result<(), NodeError> {
        let kind = match &item {
            InventoryItem::Tx(_) => "tx",
            InventoryItem::Block(_) => "block",
        };
        info!(kind, hash = %display_hash(&item.hash()), "[relay] Announcing inventory");
        Ok(())
    }

    async fn connect(&self) -> Result<(), NodeError> {
        self.connected.store(true, Ordering::SeqCst);
        info!("[relay] Connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NodeError> {
        self.connected.store(false, Ordering::SeqCst);
        self.syncing.store(false, Ordering::SeqCst);
        info!("[relay] Disconnected");
        Ok(())
    }

    async fn start_sync(&self) -> Result<(), NodeError> {
        self.syncing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_sync(&self) -> Result<(), NodeError> {
        self.syncing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every broadcast. Can be told to fail them.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    broadcasts: Mutex<Vec<InventoryItem>>,
    calls: Mutex<Vec<&'static str>>,
    failing: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every broadcast from now on returns `NodeError::Relay`.
    pub fn fail_broadcasts(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn broadcasts(&self) -> Vec<InventoryItem> {
        self.broadcasts.lock().clone()
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().len()
    }

    /// Network-level calls in the order they were made.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RelayPort for RecordingRelay {
    async fn broadcast(&self, item: InventoryItem) -> Result<(), NodeError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NodeError::Relay("no peers".into()));
        }
        self.broadcasts.lock().push(item);
        Ok(())
    }

    async fn connect(&self) -> Result<(), NodeError> {
        self.calls.lock().push("connect");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NodeError> {
        self.calls.lock().push("disconnect");
        Ok(())
    }

    async fn start_sync(&self) -> Result<(), NodeError> {
        self.calls.lock().push("start_sync");
        Ok(())
    }

    async fn stop_sync(&self) -> Result<(), NodeError> {
        self.calls.lock().push("stop_sync");
        Ok(())
    }
}
