//! Atomicity under commit failure: a logical transaction either lands whole
//! or leaves nothing behind.

mod support;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use merchkit_catalog::ProductState;
use merchkit_core::{AggregateId, CorrelationId, UserId};
use merchkit_events::{DomainEvent, EventName, StatePair};
use support::{command, event_count, outbox_rows, snapshot_version, start_core};

#[tokio::test]
async fn failed_physical_commit_leaves_no_partial_state() {
    let core = start_core().await;
    let product_id = Uuid::now_v7();

    core.runtime
        .execute(command(
            "create_product",
            json!({"product_id": product_id, "title": "Original"}),
        ))
        .await
        .unwrap();

    // Hand-build a logical transaction whose event append collides with the
    // committed creation event. The batcher must reject the whole batch:
    // event, read-model upsert, outbox row and snapshot all roll back.
    let aggregate_id = AggregateId::from_uuid(product_id);
    let uow = core.runtime.unit_of_work();
    let result = uow
        .with_transaction(|repos| async move {
            let snapshot = repos
                .snapshots()
                .get(aggregate_id)
                .await?
                .expect("seeded product must have a snapshot");
            let mut state: ProductState = snapshot.state()?;
            state.title = "Phantom".to_string();
            state.meta.version = 99;

            let event = DomainEvent {
                aggregate_id,
                version: 0, // collides with (aggregate_id, 0)
                event_name: EventName::ProductUpdated,
                occurred_at: Utc::now(),
                correlation_id: CorrelationId::new(),
                user_id: UserId::new(),
                payload: StatePair {
                    prior_state: None,
                    new_state: serde_json::to_value(&state)?,
                },
            };
            // The colliding append goes last so the rollback must undo
            // statements that had already applied inside the transaction.
            repos.products().save(&state)?;
            repos.outbox().enqueue(&event)?;
            repos
                .snapshots()
                .save(aggregate_id, CorrelationId::new(), 99, &state)?;
            repos.events().append(&event)?;
            Ok(())
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), "StorageError");

    // No event, no snapshot change, no outbox row, no read-model change.
    assert_eq!(event_count(core.runtime.pool(), product_id).await, 1);
    assert_eq!(snapshot_version(core.runtime.pool(), product_id).await, Some(0));
    assert_eq!(outbox_rows(core.runtime.pool(), product_id).await.len(), 1);

    let view = core
        .runtime
        .query(json!({"type": "get_product", "product_id": product_id}))
        .await;
    let ok = view.ok().unwrap();
    assert_eq!(ok["title"], "Original");
    assert_eq!(ok["version"], 0);

    core.runtime.stop().await;
}

#[tokio::test]
async fn an_error_inside_the_scope_discards_the_staged_batch() {
    let core = start_core().await;
    let product_id = Uuid::now_v7();

    core.runtime
        .execute(command(
            "create_product",
            json!({"product_id": product_id, "title": "Original"}),
        ))
        .await
        .unwrap();

    let aggregate_id = AggregateId::from_uuid(product_id);
    let uow = core.runtime.unit_of_work();
    let result: Result<(), merchkit_infra::CoreError> = uow
        .with_transaction(|repos| async move {
            let snapshot = repos.snapshots().get(aggregate_id).await?.unwrap();
            let state: ProductState = snapshot.state()?;

            let event = DomainEvent {
                aggregate_id,
                version: 1,
                event_name: EventName::ProductUpdated,
                occurred_at: Utc::now(),
                correlation_id: CorrelationId::new(),
                user_id: UserId::new(),
                payload: StatePair {
                    prior_state: None,
                    new_state: serde_json::to_value(&state)?,
                },
            };
            repos.events().append(&event)?;
            repos.products().save(&state)?;

            // The scope fails after staging: nothing may be submitted.
            Err(merchkit_infra::CoreError::DomainRule(
                "scope failed after staging".to_string(),
            ))
        })
        .await;

    assert!(result.is_err());
    assert_eq!(event_count(core.runtime.pool(), product_id).await, 1);

    core.runtime.stop().await;
}

#[tokio::test]
async fn a_deadline_before_submission_leaves_no_durable_effects() {
    let core = start_core().await;
    let product_id = Uuid::now_v7();

    let err = core
        .runtime
        .execute_with_deadline(
            command(
                "create_product",
                json!({"product_id": product_id, "title": "Too slow"}),
            ),
            Duration::ZERO,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "StorageError");

    assert_eq!(event_count(core.runtime.pool(), product_id).await, 0);
    assert_eq!(snapshot_version(core.runtime.pool(), product_id).await, None);

    core.runtime.stop().await;
}
