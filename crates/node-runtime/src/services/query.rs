//! # Unified Query Layer
//!
//! Answers coin, metadata and history queries across the pool and the
//! confirmed indexes. The pool wins: a confirmed coin the pool spends is
//! reported as not found, and pool history is merged with confirmed history
//! under a single limit.
//!
//! Not found is `None` or an empty list, never an error. Collaborator
//! failures propagate unchanged.

use std::sync::Arc;

use shared_types::{
    display_hash, Address, AddressQuery, AnnotatedTx, Block, Coin, CoinView, Hash, OutPoint,
    TxMeta,
};

use crate::error::NodeError;
use crate::ports::{AddrIndexPort, ChainPort, MempoolPort, TxIndexPort};
use crate::services::TokenOverlay;

/// Options for address history queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryOptions {
    /// `None` or zero means no limit.
    pub limit: Option<usize>,
    /// Newest first.
    pub reverse: bool,
    /// Continue after this transaction hash.
    pub after: Option<Hash>,
    pub include_token: bool,
}

impl HistoryOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn after(mut self, hash: Hash) -> Self {
        self.after = Some(hash);
        self
    }

    pub fn with_token(mut self) -> Self {
        self.include_token = true;
        self
    }

    fn query(&self) -> AddressQuery {
        AddressQuery {
            limit: self.limit,
            reverse: self.reverse,
            after: self.after,
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    chain: Arc<dyn ChainPort>,
    mempool: Arc<dyn MempoolPort>,
    tx_index: Option<Arc<dyn TxIndexPort>>,
    addr_index: Option<Arc<dyn AddrIndexPort>>,
    tokens: TokenOverlay,
}

impl QueryService {
    pub fn new(
        chain: Arc<dyn ChainPort>,
        mempool: Arc<dyn MempoolPort>,
        tx_index: Option<Arc<dyn TxIndexPort>>,
        addr_index: Option<Arc<dyn AddrIndexPort>>,
        tokens: TokenOverlay,
    ) -> Self {
        Self {
            chain,
            mempool,
            tx_index,
            addr_index,
            tokens,
        }
    }

    pub async fn get_block(&self, hash: &Hash) -> Result<Option<Block>, NodeError> {
        self.chain.get_block(hash).await
    }

    /// Pool coin, else confirmed coin unless a pool transaction spends it.
    pub async fn get_coin(
        &self,
        hash: &Hash,
        index: u32,
        include_token: bool,
    ) -> Result<Option<Coin>, NodeError> {
        let outpoint = OutPoint::new(*hash, index);
        let coin = match self.mempool.get_coin(&outpoint) {
            Some(coin) => Some(coin),
            None if self.mempool.is_spent(&outpoint) => None,
            None => self.chain.get_coin(&outpoint).await?,
        };
        match coin {
            Some(coin) if include_token => Ok(Some(self.tokens.annotate_coin(coin).await)),
            coin => Ok(coin),
        }
    }

    /// Pool coins, then confirmed coins the pool does not spend.
    pub async fn get_coins_by_address(
        &self,
        address: &Address,
        include_token: bool,
    ) -> Result<Vec<Coin>, NodeError> {
        let mut coins = self.mempool.get_coins_by_address(address);
        if let Some(addr_index) = &self.addr_index {
            let confirmed = addr_index.get_coins_by_address(address).await?;
            coins.extend(
                confirmed
                    .into_iter()
                    .filter(|coin| !self.mempool.is_spent(&coin.outpoint)),
            );
        }

        if !include_token {
            return Ok(coins);
        }
        let mut annotated = Vec::with_capacity(coins.len());
        for coin in coins {
            annotated.push(self.tokens.annotate_coin(coin).await);
        }
        Ok(annotated)
    }

    pub async fn get_meta(&self, hash: &Hash, include_token: bool) -> Result<Option<TxMeta>, NodeError> {
        let meta = match self.mempool.get_meta(hash) {
            Some(meta) => Some(meta),
            None => match &self.tx_index {
                Some(tx_index) => tx_index.get_meta(hash).await?,
                None => None,
            },
        };
        match meta {
            Some(meta) if include_token => Ok(Some(self.tokens.annotate_meta(meta).await)),
            meta => Ok(meta),
        }
    }

    /// Merged confirmed and pending history for `address`.
    ///
    /// Forward order lists confirmed history first, reverse order lists the
    /// pool first. The second source only fills what the limit leaves.
    /// Empty unless both the tx index and the address index are enabled.
    pub async fn get_meta_by_address(
        &self,
        address: &Address,
        options: &HistoryOptions,
    ) -> Result<Vec<TxMeta>, NodeError> {
        let (Some(tx_index), Some(addr_index)) = (&self.tx_index, &self.addr_index) else {
            return Ok(Vec::new());
        };
        let query = options.query();
        let limit = query.bound();
        let mut metas = Vec::new();

        if options.reverse {
            metas.extend(self.mempool.get_metas_by_address(address, &query));
            if let Some(rest) = remaining(limit, metas.len()) {
                let confirmed = self
                    .confirmed_metas(tx_index.as_ref(), addr_index.as_ref(), address, &query.with_limit(rest))
                    .await?;
                metas.extend(confirmed);
            }
        } else {
            metas.extend(
                self.confirmed_metas(tx_index.as_ref(), addr_index.as_ref(), address, &query)
                    .await?,
            );
            if let Some(rest) = remaining(limit, metas.len()) {
                metas.extend(
                    self.mempool
                        .get_metas_by_address(address, &query.with_limit(rest)),
                );
            }
        }

        if !options.include_token {
            return Ok(metas);
        }
        let mut annotated = Vec::with_capacity(metas.len());
        for meta in metas {
            annotated.push(self.tokens.annotate_meta(meta).await);
        }
        Ok(annotated)
    }

    /// Coins spent by the transaction `meta` describes, when known.
    pub async fn get_meta_view(&self, meta: &TxMeta) -> Result<Option<CoinView>, NodeError> {
        if !meta.is_confirmed() {
            return Ok(Some(self.mempool.get_spent_view(&meta.tx)));
        }
        match &self.tx_index {
            Some(tx_index) => tx_index.get_spent_view(&meta.tx).await,
            None => Ok(None),
        }
    }

    pub async fn get_tx(&self, hash: &Hash, include_token: bool) -> Result<Option<AnnotatedTx>, NodeError> {
        Ok(self.get_meta(hash, include_token).await?.map(into_annotated))
    }

    pub async fn get_tx_by_address(
        &self,
        address: &Address,
        options: &HistoryOptions,
    ) -> Result<Vec<AnnotatedTx>, NodeError> {
        let metas = self.get_meta_by_address(address, options).await?;
        Ok(metas.into_iter().map(into_annotated).collect())
    }

    pub async fn has_tx(&self, hash: &Hash) -> Result<bool, NodeError> {
        if self.mempool.has_tx(hash) {
            return Ok(true);
        }
        match &self.tx_index {
            Some(tx_index) => tx_index.has_tx(hash).await,
            None => Ok(false),
        }
    }

    async fn confirmed_metas(
        &self,
        tx_index: &dyn TxIndexPort,
        addr_index: &dyn AddrIndexPort,
        address: &Address,
        query: &AddressQuery,
    ) -> Result<Vec<TxMeta>, NodeError> {
        let hashes = addr_index.get_hashes_by_address(address, query).await?;
        let mut metas = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let meta = tx_index.get_meta(&hash).await?.ok_or_else(|| {
                NodeError::InvariantViolation(format!(
                    "address index lists {} but the tx index does not",
                    display_hash(&hash)
                ))
            })?;
            metas.push(meta);
        }
        Ok(metas)
    }
}

/// Budget left for the second source: `Some(None)` is unbounded, `None`
/// means the limit is spent.
fn remaining(limit: Option<usize>, used: usize) -> Option<Option<usize>> {
    match limit {
        None => Some(None),
        Some(limit) if used >= limit => None,
        Some(limit) => Some(Some(limit - used)),
    }
}

fn into_annotated(meta: TxMeta) -> AnnotatedTx {
    AnnotatedTx {
        tx: meta.tx,
        token: meta.token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_budget() {
        assert_eq!(remaining(None, 7), Some(None));
        assert_eq!(remaining(Some(2), 0), Some(Some(2)));
        assert_eq!(remaining(Some(2), 1), Some(Some(1)));
        assert_eq!(remaining(Some(2), 2), None);
        assert_eq!(remaining(Some(2), 3), None);
    }

    #[test]
    fn test_history_options_map_to_query() {
        let options = HistoryOptions::limit(0).reversed().after([4; 32]).with_token();
        let query = options.query();
        assert_eq!(query.bound(), None);
        assert!(query.reverse);
        assert_eq!(query.after, Some([4; 32]));
    }
}
