//! Main-chain rescans against an address and outpoint filter.

use std::collections::HashSet;

use shared_types::{display_hash, Address, ChainEntry, OutPoint, Transaction};
use tracing::{debug, info};

use crate::error::NodeError;
use crate::ports::ChainPort;

/// Addresses and outpoints a rescan is looking for.
///
/// Outputs paying a watched address are added to the watched outpoints, so
/// a later spend of them matches too.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    addresses: HashSet<Address>,
    outpoints: HashSet<OutPoint>,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.addresses.insert(address);
        self
    }

    pub fn with_outpoint(mut self, outpoint: OutPoint) -> Self {
        self.outpoints.insert(outpoint);
        self
    }

    pub fn watches(&self, outpoint: &OutPoint) -> bool {
        self.outpoints.contains(outpoint)
    }

    /// True when `tx` pays a watched address or spends a watched outpoint.
    pub fn matches(&mut self, tx: &Transaction) -> bool {
        let hash = tx.hash();
        let mut matched = false;

        for (index, output) in tx.outputs.iter().enumerate() {
            let Some(address) = output.address() else {
                continue;
            };
            if self.addresses.contains(&address) {
                self.outpoints.insert(OutPoint::new(hash, index as u32));
                matched = true;
            }
        }

        matched
            || tx
                .inputs
                .iter()
                .any(|input| self.outpoints.contains(&input.prevout))
    }
}

/// Walks the main chain from `start` to the tip, handing each block's
/// matching transactions to `iter`. Blocks without matches are still
/// visited with an empty list. Stops at the first error.
pub async fn scan<F>(
    chain: &dyn ChainPort,
    start: u32,
    filter: &mut ScanFilter,
    mut iter: F,
) -> Result<u32, NodeError>
where
    F: FnMut(&ChainEntry, Vec<Transaction>) -> Result<(), NodeError>,
{
    let tip = chain.tip().height;
    info!(start, tip, "[scan] Rescanning main chain");

    let mut scanned = 0;
    for height in start..=tip {
        let Some(entry) = chain.get_entry_by_height(height).await? else {
            break;
        };
        let block = chain.get_block(&entry.hash).await?.ok_or_else(|| {
            NodeError::InvariantViolation(format!(
                "main-chain block {} has no body",
                display_hash(&entry.hash)
            ))
        })?;

        let matched: Vec<Transaction> = block
            .txs
            .into_iter()
            .filter(|tx| filter.matches(tx))
            .collect();
        if !matched.is_empty() {
            debug!(height, matched = matched.len(), "[scan] Block matched");
        }
        iter(&entry, matched)?;
        scanned += 1;
    }
    Ok(scanned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChainAdapter;
    use shared_types::test_utils::{address, genesis_block, next_block, pay, COINBASE_VALUE};

    #[tokio::test]
    async fn test_scan_follows_spends_of_matched_outputs() {
        let genesis = genesis_block(&address(1));
        let chain = ChainAdapter::new(genesis.clone());
        let coinbase = OutPoint::new(genesis.txs[0].hash(), 0);

        let to_two = pay(coinbase, COINBASE_VALUE, &address(2));
        let b1 = next_block(&chain.tip(), &address(9), vec![to_two.clone()]);
        let tip = chain.connect_block(b1).await.unwrap();
        let onward = pay(OutPoint::new(to_two.hash(), 0), to_two.outputs[0].value, &address(3));
        chain
            .connect_block(next_block(&tip, &address(9), vec![onward.clone()]))
            .await
            .unwrap();

        let mut filter = ScanFilter::new().with_address(address(2));
        let mut seen = Vec::new();
        let scanned = scan(&chain, 0, &mut filter, |entry, txs| {
            seen.push((entry.height, txs.iter().map(|tx| tx.hash()).collect::<Vec<_>>()));
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(scanned, 3);
        assert_eq!(
            seen,
            vec![(0, vec![]), (1, vec![to_two.hash()]), (2, vec![onward.hash()])]
        );
        assert!(filter.watches(&OutPoint::new(to_two.hash(), 0)));
    }

    #[tokio::test]
    async fn test_scan_stops_on_iterator_error() {
        let genesis = genesis_block(&address(1));
        let chain = ChainAdapter::new(genesis);
        let mut filter = ScanFilter::new();
        let err = scan(&chain, 0, &mut filter, |_, _| {
            Err(NodeError::Relay("stop".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, NodeError::Relay(_)));
    }
}
