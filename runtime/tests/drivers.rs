//! Integration tests for the keeper and callback-pump drivers
//!
//! Tokio time is paused, so keeper ticks are driven by auto-advance while the
//! controller's own clock is moved explicitly through the harness.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use chrono::Duration as ChronoDuration;
use rwa_issuer_core::{Address, KeeperConfig, OracleResponse};
use rwa_issuer_runtime::{spawn_callback_pump, spawn_keeper};
use rwa_issuer_testing::{TestHarness, init_test_tracing};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

const ALICE: Address = Address::repeat_byte(0x01);

/// Let background tasks run until `condition` holds, or fail after a while.
async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Keeper
// ============================================================================

#[tokio::test(start_paused = true)]
async fn keeper_retries_stale_request() {
    init_test_tracing();
    let harness = TestHarness::new();
    let h = &harness;
    let r1 = harness.issue(ALICE, 1_000).await.unwrap();

    let keeper = spawn_keeper(
        harness.controller.clone(),
        KeeperConfig {
            poll_interval: Duration::from_secs(30),
        },
    );

    // Not stale yet: the keeper leaves the request alone
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(harness.pending_id().await, Some(r1));

    harness.clock.advance(ChronoDuration::seconds(301));
    eventually(|| async move { h.controller.get_request_status().await.retry_count == 1 }).await;
    assert_ne!(harness.pending_id().await, Some(r1));

    keeper.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn keeper_stops_at_retry_ceiling() {
    init_test_tracing();
    let harness = TestHarness::builder().max_retries(2).build();
    let h = &harness;
    harness.issue(ALICE, 1_000).await.unwrap();

    let keeper = spawn_keeper(
        harness.controller.clone(),
        KeeperConfig {
            poll_interval: Duration::from_secs(10),
        },
    );

    for expected in 1..=2 {
        harness.clock.advance(ChronoDuration::seconds(301));
        eventually(|| async move {
            h.controller.get_request_status().await.retry_count == expected
        })
        .await;
    }

    // Exhausted: upkeep is never ready again, the request stays until the owner acts
    harness.clock.advance(ChronoDuration::seconds(301));
    tokio::time::sleep(Duration::from_secs(60)).await;
    let status = harness.controller.get_request_status().await;
    assert!(status.has_pending);
    assert!(status.is_timed_out);
    assert_eq!(status.retry_count, 2);
    assert_eq!(harness.oracle.submission_count(), 3);

    keeper.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn keeper_shutdown_stops_task() {
    let harness = TestHarness::new();
    let keeper = spawn_keeper(harness.controller.clone(), KeeperConfig::default());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!keeper.is_finished());
    keeper.shutdown().await;
}

// ============================================================================
// Callback pump
// ============================================================================

#[tokio::test(start_paused = true)]
async fn pump_delivers_callbacks_in_order() {
    init_test_tracing();
    let harness = TestHarness::new();
    let h = &harness;
    let (tx, rx) = mpsc::channel(8);
    let pump = spawn_callback_pump(harness.controller.clone(), rx);

    let r1 = harness.issue(ALICE, 1_000).await.unwrap();
    tx.send(OracleResponse::failure(r1, b"API request failed".to_vec()))
        .await
        .unwrap();
    // Stale duplicate: rejected by the controller, does not stop the pump
    tx.send(OracleResponse::failure(r1, b"API request failed".to_vec()))
        .await
        .unwrap();

    eventually(|| async move { h.controller.get_request_status().await.retry_count == 1 }).await;
    let r2 = harness.pending_id().await.unwrap();

    tx.send(OracleResponse::success(r2, b"ipfs://QmTest123".to_vec()))
        .await
        .unwrap();
    eventually(|| async move { h.tokens.balance_of(ALICE, 0) == 1_000 }).await;

    assert!(!harness.controller.get_request_status().await.has_pending);
    assert_eq!(harness.controller.get_request_status().await.retry_count, 0);
    assert!(!pump.is_finished());
    pump.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn pump_exits_when_channel_closes() {
    let harness = TestHarness::new();
    let (tx, rx) = mpsc::channel::<OracleResponse>(1);
    let pump = spawn_callback_pump(harness.controller.clone(), rx);

    drop(tx);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(pump.is_finished());
    pump.shutdown().await;
}
