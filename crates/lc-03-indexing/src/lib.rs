//! # Indexing Subsystem (lc-03)
//!
//! Optional lookup indexes over the confirmed chain. Each one is fed
//! main-chain blocks in height order through [`BlockIndexer`] and can be
//! rolled back to any earlier height.
//!
//! | Index | Answers |
//! |-------|---------|
//! | [`TxIndex`] | confirmed `TxMeta` and spent view by tx hash |
//! | [`AddrIndex`] | paginated history and unspent coins by address |
//! | [`TokenIndex`] | coin token records by outpoint, token records by id |
//!
//! ## Address History Pagination
//!
//! History is kept in confirmation order. Pages follow [`AddressQuery`]:
//! `after` continues past a known hash; an unknown `after` yields nothing
//! going forward and starts from the newest entry going backward, so a
//! cursor taken from pool results resumes correctly in confirmed results.
//!
//! [`AddressQuery`]: shared_types::AddressQuery

pub mod domain;

pub use domain::{
    AddrIndex, BlockIndexer, IndexError, TokenIndex, TxIndex, DEFAULT_MAX_TXS,
};
