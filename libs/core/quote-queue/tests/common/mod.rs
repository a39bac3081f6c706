//! Behaviour every backend must share, run against each store by the test files.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use quote_queue::{
    CancelOutcome, Dispatcher, DispatcherConfig, DispatchOutcome, EnqueueOptions, MessageId,
    MessageStatus, Payload, Priority, QueueError, QueueStore, QuoteProcessor, Resolution,
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use test_utils::TestDataBuilder;
use test_utils::assertions::assert_some;
use tokio::task::JoinSet;

pub struct ApproveAll;

#[async_trait::async_trait]
impl QuoteProcessor for ApproveAll {
    async fn process(&self, payload: &Payload) -> Result<Value, QueueError> {
        Ok(json!({"decision": "approved", "coverage": payload["submission"]["coverage_amount"]}))
    }

    fn name(&self) -> &'static str {
        "ApproveAll"
    }
}

pub struct RejectAll;

#[async_trait::async_trait]
impl QuoteProcessor for RejectAll {
    async fn process(&self, _payload: &Payload) -> Result<Value, QueueError> {
        Err(QueueError::processor("underwriting service unavailable"))
    }

    fn name(&self) -> &'static str {
        "RejectAll"
    }
}

fn options(priority: Priority) -> EnqueueOptions {
    EnqueueOptions::default().with_priority(priority)
}

/// HIGH priority quote with a large coverage amount is processed to completion
pub async fn high_priority_quote_completes(store: Arc<dyn QueueStore>) {
    let builder = TestDataBuilder::from_test_name("high_priority_quote_completes");
    let dispatcher = Dispatcher::new(store.clone(), ApproveAll, DispatcherConfig::default());

    let id = store
        .enqueue(builder.quote(600_000.0), options(Priority::High))
        .await
        .unwrap();

    let dispatch = assert_some(dispatcher.dispatch_once().await.unwrap(), "dispatch");
    assert_eq!(dispatch.message_id, id);
    assert_eq!(
        dispatch.outcome,
        DispatchOutcome::Resolved(Resolution::Completed)
    );

    let message = assert_some(store.get(id).await.unwrap(), "completed message");
    assert_eq!(message.status, MessageStatus::Completed);
    assert_eq!(message.retry_count, 0);
    assert_eq!(message.payload, builder.quote(600_000.0));
    assert_eq!(
        message.result,
        Some(json!({"decision": "approved", "coverage": 600_000.0}))
    );
    assert!(message.started_at.unwrap() >= message.created_at);
    assert!(message.completed_at.unwrap() >= message.started_at.unwrap());
}

/// A processor that always fails exhausts three attempts, then dead-letters
pub async fn failing_quote_is_dead_lettered(store: Arc<dyn QueueStore>) {
    let dispatcher = Dispatcher::new(store.clone(), RejectAll, DispatcherConfig::default());
    let id = store
        .enqueue(
            Payload::new(),
            EnqueueOptions::default().with_max_retries(3),
        )
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    while let Some(dispatch) = dispatcher.dispatch_once().await.unwrap() {
        assert_eq!(dispatch.message_id, id);
        outcomes.push(dispatch.outcome);
    }

    assert_eq!(
        outcomes,
        vec![
            DispatchOutcome::Resolved(Resolution::Requeued),
            DispatchOutcome::Resolved(Resolution::Requeued),
            DispatchOutcome::Resolved(Resolution::DeadLettered),
        ]
    );

    let message = assert_some(store.get(id).await.unwrap(), "failed message");
    assert_eq!(message.status, MessageStatus::Failed);
    assert_eq!(message.retry_count, 3);
    assert!(
        message
            .error_message
            .unwrap()
            .contains("underwriting service unavailable")
    );

    // Dead-lettered messages are terminal
    assert!(store.complete(id, json!({})).await.unwrap_err().is_invalid_state());
    assert!(store.fail(id, "again").await.unwrap_err().is_invalid_state());
    assert!(store.lease_next().await.unwrap().is_none());

    let stats = store.stats(Utc::now()).await.unwrap();
    assert_eq!(stats.failed_count, 1);
    assert_eq!(stats.counters.total_leased, 3);
    assert_eq!(stats.counters.total_retries, 2);
    assert_eq!(stats.counters.total_failed, 1);
}

/// URGENT is leased before an earlier NORMAL message
pub async fn urgent_jumps_the_queue(store: Arc<dyn QueueStore>) {
    let normal = store
        .enqueue(Payload::new(), options(Priority::Normal))
        .await
        .unwrap();
    let urgent = store
        .enqueue(Payload::new(), options(Priority::Urgent))
        .await
        .unwrap();

    assert_eq!(store.lease_next().await.unwrap().unwrap().id, urgent);
    assert_eq!(store.lease_next().await.unwrap().unwrap().id, normal);
    assert!(store.lease_next().await.unwrap().is_none());
}

/// Same priority leases in arrival order
pub async fn fifo_within_priority(store: Arc<dyn QueueStore>) {
    let mut ids = Vec::new();
    for i in 0..5 {
        let id = store
            .enqueue(
                json!({"n": i}).as_object().cloned().unwrap(),
                options(Priority::High),
            )
            .await
            .unwrap();
        ids.push(id);
    }
    store
        .enqueue(Payload::new(), options(Priority::Low))
        .await
        .unwrap();

    for expected in ids {
        assert_eq!(store.lease_next().await.unwrap().unwrap().id, expected);
    }
}

/// An abandoned lease is returned to PENDING once it expires
pub async fn abandoned_lease_is_reclaimed(store: Arc<dyn QueueStore>) {
    let id = store
        .enqueue(
            Payload::new(),
            EnqueueOptions::default().with_timeout_seconds(1),
        )
        .await
        .unwrap();
    let leased = store.lease_next().await.unwrap().unwrap();
    let started = leased.started_at.unwrap();

    assert_eq!(
        store
            .reclaim_expired(started + Duration::milliseconds(500))
            .await
            .unwrap(),
        0
    );

    let later = started + Duration::seconds(2);
    assert_eq!(store.reclaim_expired(later).await.unwrap(), 1);

    let message = assert_some(store.get(id).await.unwrap(), "reclaimed message");
    assert_eq!(message.status, MessageStatus::Pending);
    assert_eq!(message.retry_count, 1);
    assert!(message.started_at.is_none());

    // Second pass finds nothing
    assert_eq!(store.reclaim_expired(later).await.unwrap(), 0);

    // The lease holder's late result is rejected
    let err = store.complete(id, json!({})).await.unwrap_err();
    assert!(err.is_invalid_state());

    // And the message can be leased again
    assert_eq!(store.lease_next().await.unwrap().unwrap().id, id);
}

pub async fn capacity_counts_pending_only(store: Arc<dyn QueueStore>, max_size: usize) {
    for _ in 0..max_size {
        store
            .enqueue(Payload::new(), EnqueueOptions::default())
            .await
            .unwrap();
    }
    let err = store
        .enqueue(Payload::new(), EnqueueOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Capacity { .. }));

    store.lease_next().await.unwrap().unwrap();
    store
        .enqueue(Payload::new(), EnqueueOptions::default())
        .await
        .unwrap();
}

pub async fn cancel_semantics(store: Arc<dyn QueueStore>) {
    let in_flight = store
        .enqueue(Payload::new(), options(Priority::Urgent))
        .await
        .unwrap();
    let waiting = store
        .enqueue(Payload::new(), options(Priority::Low))
        .await
        .unwrap();
    store.lease_next().await.unwrap().unwrap();

    assert_eq!(store.cancel(waiting).await.unwrap(), CancelOutcome::Cancelled);
    assert_eq!(
        store.cancel(waiting).await.unwrap(),
        CancelOutcome::AlreadyCancelled
    );
    assert_eq!(store.cancel(in_flight).await.unwrap(), CancelOutcome::Deferred);

    assert_eq!(
        store.complete(in_flight, json!({"premium": 10})).await.unwrap(),
        Resolution::Cancelled
    );
    let message = assert_some(store.get(in_flight).await.unwrap(), "cancelled message");
    assert_eq!(message.status, MessageStatus::Cancelled);
    assert!(message.completed_at.is_some());

    let unknown = MessageId::new();
    assert!(store.cancel(unknown).await.unwrap_err().is_invalid_state());
    assert!(store.lease_next().await.unwrap().is_none());

    let stats = store.stats(Utc::now()).await.unwrap();
    assert_eq!(stats.cancelled_count, 2);
}

pub async fn purge_respects_retention(store: Arc<dyn QueueStore>) {
    let id = store
        .enqueue(Payload::new(), EnqueueOptions::default())
        .await
        .unwrap();
    store.lease_next().await.unwrap().unwrap();
    store.complete(id, json!({})).await.unwrap();

    let now = Utc::now();
    assert_eq!(
        store
            .purge_terminal(now - Duration::hours(24))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        store
            .purge_terminal(now + Duration::seconds(1))
            .await
            .unwrap(),
        1
    );
    assert!(store.get(id).await.unwrap().is_none());
}

pub async fn concurrent_leases_are_exclusive(store: Arc<dyn QueueStore>, messages: usize) {
    for i in 0..messages {
        store
            .enqueue(
                json!({"n": i}).as_object().cloned().unwrap(),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
    }

    let mut tasks = JoinSet::new();
    for _ in 0..6 {
        let store = store.clone();
        tasks.spawn(async move {
            let mut leased = Vec::new();
            while let Some(message) = store.lease_next().await.unwrap() {
                leased.push(message.id);
            }
            leased
        });
    }

    let mut seen = HashSet::new();
    while let Some(result) = tasks.join_next().await {
        for id in result.unwrap() {
            assert!(seen.insert(id), "message {id} leased twice");
        }
    }
    assert_eq!(seen.len(), messages);
}

/// A requeued message goes back to its original slot, not the back of its tier
pub async fn retry_keeps_fifo_position(store: Arc<dyn QueueStore>) {
    let mut ids = Vec::new();
    for i in 0..3 {
        let id = store
            .enqueue(
                json!({"n": i}).as_object().cloned().unwrap(),
                options(Priority::Normal),
            )
            .await
            .unwrap();
        ids.push(id);
    }

    assert_eq!(store.lease_next().await.unwrap().unwrap().id, ids[0]);
    assert_eq!(store.lease_next().await.unwrap().unwrap().id, ids[1]);

    // Resolved out of order, still leased back in arrival order
    assert_eq!(
        store.fail(ids[1], "rating engine timeout").await.unwrap(),
        Resolution::Requeued
    );
    assert_eq!(
        store.fail(ids[0], "rating engine timeout").await.unwrap(),
        Resolution::Requeued
    );

    for expected in &ids {
        let message = store.lease_next().await.unwrap().unwrap();
        assert_eq!(message.id, *expected);
    }
    assert!(store.lease_next().await.unwrap().is_none());

    let retried = assert_some(store.get(ids[0]).await.unwrap(), "retried message");
    assert_eq!(retried.retry_count, 1);
    assert_eq!(retried.status, MessageStatus::Processing);
}

/// A cancel recorded during processing wins when the lease expires
pub async fn deferred_cancel_resolved_by_reclaim(store: Arc<dyn QueueStore>) {
    let id = store
        .enqueue(
            Payload::new(),
            EnqueueOptions::default()
                .with_timeout_seconds(1)
                .with_max_retries(3),
        )
        .await
        .unwrap();
    let leased = store.lease_next().await.unwrap().unwrap();
    let started = leased.started_at.unwrap();

    assert_eq!(store.cancel(id).await.unwrap(), CancelOutcome::Deferred);
    assert_eq!(
        store
            .reclaim_expired(started + Duration::seconds(2))
            .await
            .unwrap(),
        1
    );

    let message = assert_some(store.get(id).await.unwrap(), "cancelled message");
    assert_eq!(message.status, MessageStatus::Cancelled);
    assert!(message.completed_at.is_some());
    assert!(store.lease_next().await.unwrap().is_none());

    assert_eq!(
        store.cancel(id).await.unwrap(),
        CancelOutcome::AlreadyCancelled
    );
    assert!(store.complete(id, json!({})).await.unwrap_err().is_invalid_state());

    let stats = store.stats(Utc::now()).await.unwrap();
    assert_eq!(stats.pending_count, 0);
    assert_eq!(stats.processing_count, 0);
    assert_eq!(stats.cancelled_count, 1);
}
