//! Integration tests against live nodes
//!
//! Run with: cargo test --test integration_test -- --ignored --nocapture
//!
//! Prerequisites:
//! - Source chain RPC (e.g. Anvil) reachable at SOURCE_RPC_URL
//! - SOURCE_BRIDGE_ADDRESS deployed on it
//! - Destination RPC at DEST_RPC_URL for the sink checks

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;

use lockmint_relayer::contracts::lock_event_filter;
use lockmint_relayer::reader::{ChainReader, EvmChainReader};
use lockmint_relayer::scanner::EventScanner;
use lockmint_relayer::sink::EvmRelaySink;
use lockmint_relayer::types::ScanWindow;

mod helpers {
    /// Test configuration loaded from environment variables
    pub struct TestConfig {
        pub source_rpc_url: String,
        pub source_bridge_address: String,
    }

    impl TestConfig {
        pub fn from_env() -> Option<Self> {
            Some(TestConfig {
                source_rpc_url: std::env::var("SOURCE_RPC_URL").ok()?,
                source_bridge_address: std::env::var("SOURCE_BRIDGE_ADDRESS").ok()?,
            })
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_source_rpc_health_check() {
    let Some(config) = helpers::TestConfig::from_env() else {
        eprintln!("SOURCE_RPC_URL / SOURCE_BRIDGE_ADDRESS not set, skipping");
        return;
    };

    let reader = EvmChainReader::new(&[config.source_rpc_url], Duration::from_secs(5))
        .expect("reader");
    let chain_id = reader.check_connectivity().await.expect("health check");
    assert!(chain_id > 0);

    let head = reader.get_head().await.expect("head");
    println!("chain {} at block {}", chain_id, head);
}

#[tokio::test]
#[ignore]
async fn test_scan_recent_blocks() {
    let Some(config) = helpers::TestConfig::from_env() else {
        eprintln!("SOURCE_RPC_URL / SOURCE_BRIDGE_ADDRESS not set, skipping");
        return;
    };

    let reader = Arc::new(
        EvmChainReader::new(&[config.source_rpc_url], Duration::from_secs(10)).expect("reader"),
    );
    let head = reader.get_head().await.expect("head");
    let bridge = Address::from_str(&config.source_bridge_address).expect("bridge address");
    let scanner = EventScanner::new(reader, lock_event_filter(bridge), 100);

    let window = ScanWindow::new(head.saturating_sub(500), head);
    let events = scanner.scan(window).await.expect("scan");
    assert!(events
        .windows(2)
        .all(|w| w[0].block_number <= w[1].block_number));
    println!("{} lock event(s) in {}", events.len(), window);
}

#[tokio::test]
#[ignore]
async fn test_destination_health_check() {
    let (Ok(rpc_url), Ok(bridge)) = (
        std::env::var("DEST_RPC_URL"),
        std::env::var("DEST_BRIDGE_ADDRESS"),
    ) else {
        eprintln!("DEST_RPC_URL / DEST_BRIDGE_ADDRESS not set, skipping");
        return;
    };

    // Anvil's first default account
    let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    let sink = EvmRelaySink::new(
        &rpc_url,
        &bridge,
        key,
        Duration::from_secs(5),
        Duration::from_secs(30),
    )
    .expect("sink");
    let chain_id = sink.check_connectivity().await.expect("health check");
    assert!(chain_id > 0);
}
