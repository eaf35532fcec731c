//! Forwards pool admissions to observers: the bus gets a
//! [`NodeEvent::TxAccepted`], the miner gets the entry.

use std::sync::Arc;

use shared_bus::{EventPublisher, InMemoryEventBus, NodeEvent};
use shared_types::Transaction;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ports::MinerPort;

pub struct TxForwarder {
    receiver: broadcast::Receiver<Transaction>,
    bus: Arc<InMemoryEventBus>,
    miner: Arc<dyn MinerPort>,
}

impl TxForwarder {
    pub fn new(
        receiver: broadcast::Receiver<Transaction>,
        bus: Arc<InMemoryEventBus>,
        miner: Arc<dyn MinerPort>,
    ) -> Self {
        Self {
            receiver,
            bus,
            miner,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(tx) => {
                    self.miner.notify_entry(&tx);
                    self.bus.publish(NodeEvent::TxAccepted { tx }).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "[node] Tx forwarder lagged behind the pool");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[node] Pool channel closed, tx forwarder exiting");
                    break;
                }
            }
        }
    }
}
