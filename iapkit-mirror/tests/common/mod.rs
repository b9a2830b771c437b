//! Shared setup for mirror integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use iapkit_lib::test_utils::{fixtures, MockStoreClient};
use iapkit_lib::ProductId;
use iapkit_mirror::{EntitlementMirror, MirrorConfig, MirrorSnapshot};

/// Two configured products, one of which is a subscription.
pub fn config() -> MirrorConfig {
    MirrorConfig::new(
        vec![ProductId::new("trial"), ProductId::new("pro")],
        vec![ProductId::new("pro")],
    )
}

/// A mock store with the configured products registered.
pub fn store_with_catalog() -> Arc<MockStoreClient> {
    let store = MockStoreClient::new();
    store.register_product(fixtures::product("trial"));
    store.register_product(fixtures::subscription_product("pro"));
    store
}

/// Wait until the bootstrap sequence has fetched the catalog and reconciled.
pub async fn settled(mirror: &EntitlementMirror) -> MirrorSnapshot {
    let mut updates = mirror.subscribe();
    let snapshot = updates
        .wait_for(|snapshot| {
            snapshot.catalog_state.is_done() && snapshot.entitlement_state.is_done()
        })
        .await
        .expect("mirror dropped")
        .clone();
    snapshot
}

/// Poll until `check` passes or a couple of seconds elapse.
pub async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
