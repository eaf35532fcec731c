//! # Events
//!
//! Chain lifecycle events consumed by the node core, and the node events it
//! publishes on the bus for observers.

use serde::{Deserialize, Serialize};
use shared_types::{Block, ChainEntry, CoinView, Hash, Transaction};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Lifecycle signals emitted by the chain after its state has changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A block became the new tip. `view` holds the coins its inputs spent.
    Connect {
        entry: ChainEntry,
        block: Block,
        view: CoinView,
    },
    /// The tip block was removed. `view` holds the coins it had spent.
    Disconnect {
        entry: ChainEntry,
        block: Block,
        view: CoinView,
    },
    /// The main chain switched branches.
    Reorganize {
        new_tip: ChainEntry,
        old_tip: ChainEntry,
    },
    /// The chain was rewound to `tip`.
    Reset { tip: ChainEntry },
    /// The chain hit an internal failure.
    Error { message: String },
}

impl ChainEvent {
    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::Connect { .. } => "connect",
            ChainEvent::Disconnect { .. } => "disconnect",
            ChainEvent::Reorganize { .. } => "reorganize",
            ChainEvent::Reset { .. } => "reset",
            ChainEvent::Error { .. } => "error",
        }
    }
}

/// Component an event or error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    Chain,
    Mempool,
    Reconciler,
    Submission,
    Node,
}

/// A failure routed onto the error channel instead of being propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: Uuid,
    pub source: EventSource,
    /// What was being done, e.g. `"connect"` or `"send_tx"`.
    pub context: String,
    pub message: String,
    pub timestamp: u64,
}

impl ErrorReport {
    pub fn new(source: EventSource, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            context: context.into(),
            message: message.into(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Notifications the node publishes for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    BlockConnected {
        entry: ChainEntry,
        tx_count: usize,
    },
    BlockDisconnected {
        entry: ChainEntry,
    },
    Reorganized {
        new_tip: ChainEntry,
        old_tip: ChainEntry,
        evicted: Vec<Hash>,
    },
    Reset {
        tip: ChainEntry,
    },
    /// The pool admitted a transaction.
    TxAccepted {
        tx: Transaction,
    },
    Error(ErrorReport),
}

impl NodeEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            NodeEvent::BlockConnected { .. }
            | NodeEvent::BlockDisconnected { .. }
            | NodeEvent::Reorganized { .. }
            | NodeEvent::Reset { .. } => EventTopic::Chain,
            NodeEvent::TxAccepted { .. } => EventTopic::Mempool,
            NodeEvent::Error(_) => EventTopic::Errors,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Tip changes applied by the reconciler.
    Chain,
    /// Pool admissions.
    Mempool,
    /// The error channel.
    Errors,
}

/// Topics a subscription receives. Empty means every topic.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    #[must_use]
    pub fn matches(&self, event: &NodeEvent) -> bool {
        self.topics.is_empty() || self.topics.contains(&event.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ChainEntry {
        ChainEntry {
            hash: [1; 32],
            prev_hash: [0; 32],
            height: 1,
            time: 0,
            chainwork: 2,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        let event = NodeEvent::BlockConnected {
            entry: entry(),
            tx_count: 1,
        };
        assert_eq!(event.topic(), EventTopic::Chain);

        let error = NodeEvent::Error(ErrorReport::new(EventSource::Submission, "send_tx", "boom"));
        assert_eq!(error.topic(), EventTopic::Errors);
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Errors]);
        let error = NodeEvent::Error(ErrorReport::new(EventSource::Chain, "chain", "x"));
        let reset = NodeEvent::Reset { tip: entry() };
        assert!(filter.matches(&error));
        assert!(!filter.matches(&reset));
        assert!(EventFilter::all().matches(&reset));
    }

    #[test]
    fn test_chain_event_kind() {
        let event = ChainEvent::Reset { tip: entry() };
        assert_eq!(event.kind(), "reset");
    }
}
