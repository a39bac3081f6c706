//! Queue behaviour against the in-process backend.

mod common;

use quote_queue::{
    CoverageThresholdRule, Dispatcher, DispatcherConfig, MemoryStore, MessageStatus, Priority,
    QueueStore, QuoteQueue,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::TestDataBuilder;
use tokio::sync::watch;

fn store(max_size: usize) -> Arc<dyn QueueStore> {
    Arc::new(MemoryStore::new(max_size))
}

#[tokio::test]
async fn test_high_priority_quote_completes() {
    common::high_priority_quote_completes(store(100)).await;
}

#[tokio::test]
async fn test_failing_quote_is_dead_lettered() {
    common::failing_quote_is_dead_lettered(store(100)).await;
}

#[tokio::test]
async fn test_urgent_jumps_the_queue() {
    common::urgent_jumps_the_queue(store(100)).await;
}

#[tokio::test]
async fn test_fifo_within_priority() {
    common::fifo_within_priority(store(100)).await;
}

#[tokio::test]
async fn test_abandoned_lease_is_reclaimed() {
    common::abandoned_lease_is_reclaimed(store(100)).await;
}

#[tokio::test]
async fn test_capacity_counts_pending_only() {
    common::capacity_counts_pending_only(store(3), 3).await;
}

#[tokio::test]
async fn test_cancel_semantics() {
    common::cancel_semantics(store(100)).await;
}

#[tokio::test]
async fn test_purge_respects_retention() {
    common::purge_respects_retention(store(100)).await;
}

#[tokio::test]
async fn test_retry_keeps_fifo_position() {
    common::retry_keeps_fifo_position(store(100)).await;
}

#[tokio::test]
async fn test_deferred_cancel_resolved_by_reclaim() {
    common::deferred_cancel_resolved_by_reclaim(store(100)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_are_exclusive() {
    common::concurrent_leases_are_exclusive(store(500), 200).await;
}

#[tokio::test]
async fn test_submitted_quote_flows_through_running_dispatcher() {
    let store = store(100);
    let queue = QuoteQueue::new(store.clone()).with_priority_rule(CoverageThresholdRule::default());
    let builder = TestDataBuilder::from_test_name("submitted_quote_flows");

    let large = queue.submit(builder.quote(600_000.0)).await.unwrap();
    let typical = queue.submit(builder.quote(250_000.0)).await.unwrap();

    let dispatcher = Dispatcher::new(store, common::ApproveAll, DispatcherConfig::new(2));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let stats = queue.get_stats().await.unwrap();
            if stats.completed_count == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("quotes were not processed in time");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let large = queue.get_status(large).await.unwrap().unwrap();
    let typical = queue.get_status(typical).await.unwrap().unwrap();
    assert_eq!(large.priority, Priority::High);
    assert_eq!(typical.priority, Priority::Normal);
    assert_eq!(large.status, MessageStatus::Completed);
    assert_eq!(
        large.result.unwrap()["decision"],
        json!("approved")
    );
}
