//! Transaction submission, relay and network passthrough.

mod common;

use std::time::Duration;

use common::Harness;
use node_runtime::ports::MempoolPort;
use node_runtime::{NodeConfig, ScanFilter, Submitted};
use shared_bus::{EventFilter, EventSource, EventTopic, NodeEvent};
use shared_types::test_utils::{address, pay, spend, COINBASE_VALUE};
use shared_types::{InventoryItem, OutPoint};
use tokio::time::timeout;

#[tokio::test]
async fn test_policy_rejection_relays_only_when_allowed() {
    let h = Harness::full().await;
    let mut errors = h.node.bus().subscribe(EventFilter::topics(vec![EventTopic::Errors]));
    // Below the dust threshold.
    let dust = spend(&[h.genesis_coin()], &[(address(2), 10)]);

    let err = h.node.send_tx(dust.clone(), false).await.unwrap_err();
    assert_eq!(err.verification().unwrap().code, "dust");
    assert_eq!(h.relay.broadcast_count(), 0);

    let outcome = h.node.send_tx(dust.clone(), true).await.unwrap();
    assert_eq!(outcome, Submitted::RelayedUnverified(dust.hash()));
    assert_eq!(h.relay.broadcasts(), vec![InventoryItem::Tx(dust.clone())]);
    assert!(!h.mempool.has_tx(&dust.hash()));

    for _ in 0..2 {
        match timeout(Duration::from_secs(1), errors.recv()).await.unwrap() {
            Some(NodeEvent::Error(report)) => assert_eq!(report.source, EventSource::Submission),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_consensus_rejection_is_never_relayed() {
    let h = Harness::full().await;
    let inflated = spend(&[h.genesis_coin()], &[(address(2), COINBASE_VALUE * 2)]);
    let err = h.node.send_tx(inflated, true).await.unwrap_err();
    assert!(err.verification().unwrap().score > 0);
    assert_eq!(h.relay.broadcast_count(), 0);
}

#[tokio::test]
async fn test_orphan_is_broadcast_but_not_pooled() {
    let h = Harness::full().await;
    let orphan = pay(OutPoint::new([3; 32], 1), COINBASE_VALUE, &address(2));
    let outcome = h.node.send_tx(orphan.clone(), false).await.unwrap();
    assert_eq!(
        outcome,
        Submitted::Orphan {
            hash: orphan.hash(),
            missing: vec![[3; 32]],
        }
    );
    assert_eq!(h.relay.broadcast_count(), 1);
    assert!(!h.node.has_tx(&orphan.hash()).await.unwrap());
}

#[tokio::test]
async fn test_accepted_tx_reaches_bus_and_miner() {
    let h = Harness::full().await;
    let mut pool_events = h.node.bus().subscribe(EventFilter::topics(vec![EventTopic::Mempool]));
    let tx = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));

    let outcome = h.node.send_tx(tx.clone(), true).await.unwrap();
    assert_eq!(outcome, Submitted::Accepted(tx.hash()));
    // Cooperative mode leaves announcement to the relay layer.
    assert_eq!(h.relay.broadcast_count(), 0);

    match timeout(Duration::from_secs(1), pool_events.recv()).await.unwrap() {
        Some(NodeEvent::TxAccepted { tx: accepted }) => assert_eq!(accepted, tx),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.miner.entries(), vec![tx.hash()]);
}

#[tokio::test]
async fn test_selfish_mode_broadcasts_accepted_txs() {
    let mut config = NodeConfig::full_for_testing();
    config.relay.selfish = true;
    let h = Harness::open(config).await;
    let tx = pay(h.genesis_coin(), COINBASE_VALUE, &address(2));

    h.node.send_tx(tx.clone(), false).await.unwrap();
    assert_eq!(h.relay.broadcasts(), vec![InventoryItem::Tx(tx)]);
}

#[tokio::test]
async fn test_relay_swallows_every_failure() {
    let mut config = NodeConfig::full_for_testing();
    config.relay.selfish = true;
    let h = Harness::open(config).await;
    h.relay.fail_broadcasts(true);

    h.node
        .relay(spend(&[h.genesis_coin()], &[(address(2), COINBASE_VALUE * 2)]))
        .await;
    h.node
        .relay(pay(h.genesis_coin(), COINBASE_VALUE, &address(2)))
        .await;

    let metrics = h.node.metrics();
    assert_eq!(metrics.submission_errors, 2);
    assert_eq!(h.mempool.hashes().len(), 1);
}

#[tokio::test]
async fn test_broadcast_and_network_calls_pass_through() {
    let h = Harness::full().await;
    let block = h.genesis.clone();
    h.node.broadcast(InventoryItem::Block(block.clone())).await.unwrap();
    assert_eq!(h.relay.broadcasts(), vec![InventoryItem::Block(block)]);

    h.node.connect().await.unwrap();
    h.node.start_sync().await.unwrap();
    h.node.stop_sync().await.unwrap();
    h.node.disconnect().await.unwrap();
    assert_eq!(
        h.relay.calls(),
        vec!["connect", "start_sync", "stop_sync", "disconnect"]
    );

    h.relay.fail_broadcasts(true);
    assert!(h
        .node
        .broadcast(InventoryItem::Block(h.genesis.clone()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_scan_reports_matching_confirmed_txs() {
    let h = Harness::full().await;
    let tx = pay(h.genesis_coin(), COINBASE_VALUE, &address(7));
    h.mine(vec![]).await;
    h.mine(vec![tx.clone()]).await;

    let mut filter = ScanFilter::new().with_address(address(7));
    let mut matches = Vec::new();
    let visited = h
        .node
        .scan(1, &mut filter, |entry, txs| {
            if !txs.is_empty() {
                matches.push((entry.height, txs));
            }
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(visited, 2);
    assert_eq!(matches, vec![(2, vec![tx])]);
}
