//! # Token Overlay
//!
//! Decorates transactions, metadata and coins with token records. The pool
//! ledger is consulted first, the token index second. Lookups never fail:
//! a broken or missing record leaves the entity as it was.

use std::sync::Arc;

use shared_types::{
    display_hash, AnnotatedTx, Coin, CoinTokenRecord, Hash, OutPoint, TokenId, TokenRecord,
    Transaction, TxMeta, TxTokenOverlay,
};
use tracing::warn;

use crate::ports::{MempoolPort, TokenIndexPort};

#[derive(Clone)]
pub struct TokenOverlay {
    mempool: Arc<dyn MempoolPort>,
    index: Option<Arc<dyn TokenIndexPort>>,
}

impl TokenOverlay {
    pub fn new(mempool: Arc<dyn MempoolPort>, index: Option<Arc<dyn TokenIndexPort>>) -> Self {
        Self { mempool, index }
    }

    /// Disabled without a token index, and while that index resyncs.
    pub fn is_active(&self) -> bool {
        self.index.as_ref().is_some_and(|index| !index.is_syncing())
    }

    pub async fn tx_records(&self, hash: &Hash) -> Vec<CoinTokenRecord> {
        let Some(index) = self.active_index() else {
            return Vec::new();
        };
        let pooled = self.mempool.get_tx_token_records(hash);
        if !pooled.is_empty() {
            return pooled;
        }
        match index.get_tx_records(hash).await {
            Ok(records) => records,
            Err(err) => {
                warn!(tx = %display_hash(hash), error = %err, "[token] Record lookup failed");
                Vec::new()
            }
        }
    }

    pub async fn coin_record(&self, outpoint: &OutPoint) -> Option<CoinTokenRecord> {
        let index = self.active_index()?;
        if let Some(record) = self.mempool.get_coin_token_record(outpoint) {
            return Some(record);
        }
        match index.get_coin_record(outpoint).await {
            Ok(record) => record,
            Err(err) => {
                warn!(%outpoint, error = %err, "[token] Coin record lookup failed");
                None
            }
        }
    }

    /// Descriptive record, looked up by the byte-reversed token id.
    pub async fn token_record(&self, token_id: &TokenId) -> Option<TokenRecord> {
        let index = self.active_index()?;
        let key = token_id.lookup_key();
        if let Some(record) = self.mempool.get_token_record(&key) {
            return Some(record);
        }
        match index.get_token_record(&key).await {
            Ok(record) => record,
            Err(err) => {
                warn!(token = %display_hash(&token_id.0), error = %err, "[token] Token lookup failed");
                None
            }
        }
    }

    /// The overlay for a transaction, if it carries supported token data.
    pub async fn overlay_for(&self, hash: &Hash) -> Option<TxTokenOverlay> {
        let outputs = self.tx_records(hash).await;
        let token_id = outputs.first()?.token_id?;
        if outputs.iter().any(|record| record.token_id.is_none()) {
            return None;
        }
        let token = self.token_record(&token_id).await;
        Some(TxTokenOverlay { token, outputs })
    }

    pub async fn annotate_tx(&self, tx: Transaction) -> AnnotatedTx {
        let token = self.overlay_for(&tx.hash()).await;
        AnnotatedTx { tx, token }
    }

    pub async fn annotate_meta(&self, mut meta: TxMeta) -> TxMeta {
        if let Some(overlay) = self.overlay_for(&meta.hash).await {
            meta.token = Some(overlay);
        }
        meta
    }

    pub async fn annotate_coin(&self, mut coin: Coin) -> Coin {
        if let Some(record) = self.coin_record(&coin.outpoint).await {
            if record.token_id.is_some() {
                coin.token = Some(record);
            }
        }
        coin
    }

    fn active_index(&self) -> Option<&Arc<dyn TokenIndexPort>> {
        self.index.as_ref().filter(|index| !index.is_syncing())
    }
}
