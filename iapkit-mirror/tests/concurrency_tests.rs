//! Contention tests for the request-state guards and the single writer.

mod common;

use std::sync::Arc;

use common::{config, settled, store_with_catalog};
use iapkit_lib::test_utils::{fixtures, MockStoreClient};
use iapkit_lib::{ProductId, PurchaseOutcome};
use iapkit_mirror::{EntitlementMirror, MirrorConfig, RequestKind};
use tokio::task::JoinSet;

#[tokio::test]
async fn test_concurrent_catalog_fetches_hit_store_once() {
    let store = store_with_catalog();
    let mirror = Arc::new(EntitlementMirror::spawn(config(), store.clone()).unwrap());
    settled(&mirror).await;
    mirror.reset_request_state().await;

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let mirror = Arc::clone(&mirror);
        tasks.spawn(async move { mirror.fetch_catalog().await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    // One bootstrap fetch plus exactly one for the 50 contenders.
    assert_eq!(store.fetch_calls(), 2);
    assert!(mirror.request_state(RequestKind::Catalog).is_done());
}

#[tokio::test]
async fn test_concurrent_reconciles_fetch_snapshot_once() {
    let store = store_with_catalog();
    store.script_entitlements(vec![fixtures::verified("pro")]);
    let mirror = Arc::new(EntitlementMirror::spawn(config(), store.clone()).unwrap());
    settled(&mirror).await;
    mirror.reset_request_state().await;

    let mut tasks = JoinSet::new();
    for _ in 0..50 {
        let mirror = Arc::clone(&mirror);
        tasks.spawn(async move { mirror.reconcile_purchases(false).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert_eq!(store.entitlement_calls(), 2);
    assert!(mirror.is_purchased(&ProductId::new("pro")));
}

#[tokio::test]
async fn test_concurrent_purchases_of_distinct_products_all_apply() {
    let store = MockStoreClient::new();
    let ids: Vec<ProductId> = (0..20)
        .map(|n| ProductId::new(format!("product.{n}")))
        .collect();
    for id in &ids {
        store.register_product(fixtures::product(id.as_str()));
        store.script_purchase(
            id.clone(),
            PurchaseOutcome::Success(fixtures::verified(id.as_str())),
        );
    }

    let mirror = Arc::new(
        EntitlementMirror::spawn(MirrorConfig::new(ids.clone(), Vec::new()), store.clone())
            .unwrap(),
    );
    settled(&mirror).await;

    let mut tasks = JoinSet::new();
    for id in ids.clone() {
        let mirror = Arc::clone(&mirror);
        tasks.spawn(async move { mirror.purchase(&id).await });
    }
    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap().unwrap().is_some());
    }

    assert_eq!(mirror.purchased(), ids.into_iter().collect());
    assert_eq!(store.finished().len(), 20);
}
