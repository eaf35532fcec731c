//! # Ports
//!
//! Contracts between the node core and its collaborators. Adapters in
//! [`crate::adapters`] implement them; the reconciler and the services only
//! see these traits.

pub mod outbound;

pub use outbound::{
    AddOutcome, AddrIndexPort, ChainEventSink, ChainPort, IndexSync, MempoolPort, MinerPort,
    Reinstatement, RelayPort, TokenIndexPort, TxIndexPort,
};
