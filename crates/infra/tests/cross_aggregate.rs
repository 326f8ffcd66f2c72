//! Cross-aggregate transactions: variant create + SKU reservation.

mod support;

use serde_json::json;
use uuid::Uuid;

use merchkit_catalog::SkuReservation;
use support::{command, event_count, event_names_for, snapshot_version, start_core};

fn create_variant_cmd(variant_id: Uuid, sku: &str) -> merchkit_infra::CommandEnvelope {
    command(
        "create_variant",
        json!({
            "variant_id": variant_id,
            "product_id": Uuid::now_v7(),
            "sku": sku,
            "price_cents": 100,
            "inventory_quantity": 1
        }),
    )
}

#[tokio::test]
async fn creating_a_variant_reserves_its_sku_with_exactly_two_created_events() {
    let core = start_core().await;
    let variant_id = Uuid::now_v7();

    core.runtime
        .execute(create_variant_cmd(variant_id, "SKU-X"))
        .await
        .unwrap();

    let reservation_id: Uuid = SkuReservation::reservation_id("SKU-X").into();
    assert_eq!(
        event_names_for(core.runtime.pool(), variant_id).await,
        vec![(0, "variant.created".to_string())]
    );
    assert_eq!(
        event_names_for(core.runtime.pool(), reservation_id).await,
        vec![(0, "sku.created".to_string())]
    );

    core.runtime.stop().await;
}

#[tokio::test]
async fn a_taken_sku_rolls_back_the_variant_too() {
    let core = start_core().await;
    let first = Uuid::now_v7();
    let second = Uuid::now_v7();

    core.runtime
        .execute(create_variant_cmd(first, "SKU-DUP"))
        .await
        .unwrap();

    let err = core
        .runtime
        .execute(create_variant_cmd(second, "SKU-DUP"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DomainRuleViolation");
    assert!(err.to_string().contains("SKU-DUP"));

    // Exactly zero events for the failed variant; the reservation stream is
    // untouched.
    let reservation_id: Uuid = SkuReservation::reservation_id("SKU-DUP").into();
    assert_eq!(event_count(core.runtime.pool(), second).await, 0);
    assert_eq!(snapshot_version(core.runtime.pool(), second).await, None);
    assert_eq!(event_count(core.runtime.pool(), reservation_id).await, 1);

    core.runtime.stop().await;
}

#[tokio::test]
async fn archiving_a_variant_releases_its_sku_for_reuse() {
    let core = start_core().await;
    let first = Uuid::now_v7();
    let second = Uuid::now_v7();

    core.runtime
        .execute(create_variant_cmd(first, "SKU-R"))
        .await
        .unwrap();
    core.runtime
        .execute(command(
            "archive_variant",
            json!({"variant_id": first, "expected_version": 0}),
        ))
        .await
        .unwrap();

    let reservation_id: Uuid = SkuReservation::reservation_id("SKU-R").into();
    assert_eq!(
        event_names_for(core.runtime.pool(), reservation_id).await,
        vec![
            (0, "sku.created".to_string()),
            (1, "sku.released".to_string()),
        ]
    );

    // The released SKU can be reclaimed by a new variant.
    core.runtime
        .execute(create_variant_cmd(second, "SKU-R"))
        .await
        .unwrap();
    assert_eq!(
        event_names_for(core.runtime.pool(), reservation_id).await.last().unwrap(),
        &(2, "sku.reserved".to_string())
    );

    core.runtime.stop().await;
}

#[tokio::test]
async fn variants_without_a_sku_reserve_nothing() {
    let core = start_core().await;
    let variant_id = Uuid::now_v7();

    core.runtime
        .execute(create_variant_cmd(variant_id, ""))
        .await
        .unwrap();

    // Only the variant's own stream exists.
    let total_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
        .fetch_one(core.runtime.pool())
        .await
        .unwrap();
    assert_eq!(total_events, 1);

    core.runtime.stop().await;
}
