//! Outbox processor behaviour: retries, at-least-once identity, DLQ.

mod support;

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use support::{command, dlq_count, eventually, outbox_rows, start_core_with, FlakyPublisher};

#[tokio::test]
async fn delivery_retries_then_succeeds_with_a_stable_id() {
    // Publisher fails twice, then succeeds: pending → inflight → pending(1)
    // → inflight → pending(2) → inflight → delivered(3).
    let publisher = FlakyPublisher::failing(2);
    let core = start_core_with(publisher.clone(), 5).await;
    let product_id = Uuid::now_v7();

    core.runtime
        .execute(command(
            "create_product",
            json!({"product_id": product_id, "title": "Retryable"}),
        ))
        .await
        .unwrap();

    let pool = core.runtime.pool().clone();
    eventually(Duration::from_secs(5), || {
        let pool = pool.clone();
        async move {
            let rows = outbox_rows(&pool, product_id).await;
            rows.len() == 1 && rows[0].1 == "delivered"
        }
    })
    .await;

    let rows = outbox_rows(core.runtime.pool(), product_id).await;
    assert_eq!(rows[0].2, 3, "two failures plus the delivering attempt");

    // At-least-once, idempotent by id: every attempt carried the same
    // outbox id, and it is the row's id.
    let attempts = publisher.attempts();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.id.to_string() == rows[0].0));
    assert_eq!(publisher.delivered().len(), 1);

    core.runtime.stop().await;
}

#[tokio::test]
async fn exhausted_retries_dead_letter_the_entry() {
    let publisher = FlakyPublisher::failing(u32::MAX);
    let core = start_core_with(publisher.clone(), 3).await;
    let product_id = Uuid::now_v7();

    core.runtime
        .execute(command(
            "create_product",
            json!({"product_id": product_id, "title": "Doomed"}),
        ))
        .await
        .unwrap();

    let pool = core.runtime.pool().clone();
    eventually(Duration::from_secs(5), || {
        let pool = pool.clone();
        async move {
            let rows = outbox_rows(&pool, product_id).await;
            rows.len() == 1 && rows[0].1 == "dead"
        }
    })
    .await;

    let rows = outbox_rows(core.runtime.pool(), product_id).await;
    assert_eq!(rows[0].2, 3);
    assert_eq!(
        rows[0].3.as_deref(),
        Some("delivery failed: simulated transport failure")
    );
    assert_eq!(dlq_count(core.runtime.pool(), product_id).await, 1);
    assert!(publisher.delivered().is_empty());

    core.runtime.stop().await;
}

#[tokio::test]
async fn every_committed_event_is_eventually_delivered() {
    let publisher = FlakyPublisher::reliable();
    let core = start_core_with(publisher.clone(), 5).await;

    let mut product_ids = Vec::new();
    for n in 0..5 {
        let product_id = Uuid::now_v7();
        core.runtime
            .execute(command(
                "create_product",
                json!({"product_id": product_id, "title": format!("P{n}")}),
            ))
            .await
            .unwrap();
        core.runtime
            .execute(command(
                "publish_product",
                json!({"product_id": product_id, "expected_version": 0}),
            ))
            .await
            .unwrap();
        product_ids.push(product_id);
    }

    let expected = product_ids.len() * 2;
    let publisher_probe = publisher.clone();
    eventually(Duration::from_secs(5), move || {
        let publisher = publisher_probe.clone();
        async move { publisher.delivered().len() == expected }
    })
    .await;

    for product_id in product_ids {
        for (_, status, attempts, _) in outbox_rows(core.runtime.pool(), product_id).await {
            assert_eq!(status, "delivered");
            assert_eq!(attempts, 1);
        }
    }

    core.runtime.stop().await;
}
