//! # Node Runtime Library
//!
//! The reconciliation and query core of a full node. Chain lifecycle events
//! are reconciled into the pending pool and the optional indexes one at a
//! time; queries read the pool first and the confirmed indexes second;
//! submissions go through the pool and out to the relay.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: the core consumes ports in [`ports`], the
//!   in-memory subsystems in [`adapters`] implement them
//! - **Serialized reconciliation**: one mailbox, one event at a time
//! - **Isolated failures**: handler errors go to the error channel on the
//!   event bus, never back to the chain
//!
//! The `ledger-node` binary wires the in-memory subsystems together.

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod container;
pub mod error;
pub mod genesis;
pub mod handlers;
pub mod metrics;
pub mod node;
pub mod ports;
pub mod reporting;
pub mod services;
pub mod telemetry;

pub use container::{Collaborators, ConfigError, NodeConfig, SubsystemContainer};
pub use error::NodeError;
pub use node::Node;
pub use services::{HistoryOptions, ScanFilter, Submitted};
