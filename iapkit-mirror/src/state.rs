//! Request-state machine and the owned entitlement state.
//!
//! [`EntitlementState`] is owned by the mirror's writer task; every mutation
//! publishes a fresh [`MirrorSnapshot`] to the watch channel observers hold,
//! so reads never contend with writes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use iapkit_lib::{Product, ProductId, Transaction};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::MirrorConfig;

/// Lifecycle of a guarded store request class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// No request performed yet.
    #[default]
    NotStarted,
    /// A request started and has not completed.
    ///
    /// A failed request also stays here; the only way back is an explicit
    /// reset.
    InProgress,
    /// The request completed and its result is mirrored.
    Done,
}

impl RequestState {
    /// Check if a request is currently underway (or failed without reset).
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    /// Check if the request completed successfully.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// The guarded request classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Product catalog fetch.
    Catalog,
    /// Entitlement reconciliation.
    Entitlements,
}

/// Point-in-time copy of everything the mirror exposes to observers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MirrorSnapshot {
    /// Catalog entries fetched from the store, empty until the first
    /// successful fetch.
    pub catalog: Vec<Product>,
    /// Product identifiers currently entitled.
    pub purchased: HashSet<ProductId>,
    /// Expiry timestamps per subscription identifier. An absent entry means
    /// "unknown", not "unowned".
    pub subscription_expirations: HashMap<ProductId, i64>,
    /// State of the catalog fetch request class.
    pub catalog_state: RequestState,
    /// State of the entitlement reconciliation request class.
    pub entitlement_state: RequestState,
}

impl MirrorSnapshot {
    /// Check if a product is currently entitled.
    pub fn is_purchased(&self, id: &ProductId) -> bool {
        self.purchased.contains(id)
    }

    /// Look up a catalog entry by identifier.
    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.catalog.iter().find(|product| product.id == *id)
    }

    /// Known expiry timestamp for a subscription identifier.
    pub fn expiration(&self, id: &ProductId) -> Option<i64> {
        self.subscription_expirations.get(id).copied()
    }

    /// Check if a subscription's known expiry lies after `now`.
    ///
    /// Returns false when no expiry is known.
    pub fn is_subscription_active(&self, id: &ProductId, now: i64) -> bool {
        self.expiration(id).is_some_and(|end| end > now)
    }

    /// State of the given request class.
    pub fn request_state(&self, kind: RequestKind) -> RequestState {
        match kind {
            RequestKind::Catalog => self.catalog_state,
            RequestKind::Entitlements => self.entitlement_state,
        }
    }
}

/// The mutable entitlement state, owned by the mirror's writer task.
pub(crate) struct EntitlementState {
    config: Arc<MirrorConfig>,
    catalog: Vec<Product>,
    purchased: HashSet<ProductId>,
    expirations: HashMap<ProductId, i64>,
    catalog_state: RequestState,
    entitlement_state: RequestState,
    watch: watch::Sender<MirrorSnapshot>,
}

impl EntitlementState {
    /// Create state seeded from the configuration.
    ///
    /// Seeded identifiers outside the configured product set are dropped.
    pub(crate) fn new(config: Arc<MirrorConfig>, watch: watch::Sender<MirrorSnapshot>) -> Self {
        let purchased = config
            .seed_purchased
            .iter()
            .filter(|id| config.is_configured(id))
            .cloned()
            .collect();
        let state = Self {
            config,
            catalog: Vec::new(),
            purchased,
            expirations: HashMap::new(),
            catalog_state: RequestState::NotStarted,
            entitlement_state: RequestState::NotStarted,
            watch,
        };
        state.publish();
        state
    }

    fn request_state_mut(&mut self, kind: RequestKind) -> &mut RequestState {
        match kind {
            RequestKind::Catalog => &mut self.catalog_state,
            RequestKind::Entitlements => &mut self.entitlement_state,
        }
    }

    /// Claim a request class, returning whether the caller should proceed.
    ///
    /// Only a `NotStarted` class can be claimed; `InProgress` and `Done`
    /// both refuse, making the underlying store call at-most-once until the
    /// consumer resets.
    pub(crate) fn begin(&mut self, kind: RequestKind) -> bool {
        let slot = self.request_state_mut(kind);
        if *slot != RequestState::NotStarted {
            return false;
        }
        *slot = RequestState::InProgress;
        self.publish();
        true
    }

    /// Install the fetched catalog and mark the fetch done.
    pub(crate) fn complete_catalog(&mut self, products: Vec<Product>) {
        self.catalog = products;
        self.catalog_state = RequestState::Done;
        self.publish();
    }

    /// Replace the purchased set with a reconciled one.
    ///
    /// This is a full replace, not a merge: identifiers absent from
    /// `entitled` are dropped. Unconfigured identifiers are filtered out.
    pub(crate) fn replace_purchased(&mut self, entitled: HashSet<ProductId>) {
        let config = &self.config;
        self.purchased = entitled
            .into_iter()
            .filter(|id| config.is_configured(id))
            .collect();
        self.entitlement_state = RequestState::Done;
        self.publish();
    }

    /// Apply a single verified transaction event from the feed.
    ///
    /// A revoked transaction removes its identifier; an unrevoked one adds
    /// it, provided it is configured.
    pub(crate) fn apply(&mut self, transaction: &Transaction) {
        if transaction.is_revoked() {
            if self.purchased.remove(&transaction.product_id) {
                tracing::debug!("entitlement revoked for {}", transaction.product_id);
            }
        } else if self.config.is_configured(&transaction.product_id) {
            self.purchased.insert(transaction.product_id.clone());
        }
        self.publish();
    }

    /// Record a locally completed purchase.
    pub(crate) fn record_purchase(&mut self, transaction: &Transaction) {
        if self.config.is_configured(&transaction.product_id) {
            self.purchased.insert(transaction.product_id.clone());
        }
        if self.config.is_subscription(&transaction.product_id) {
            if let Some(end) = transaction.expiration_date {
                self.expirations.insert(transaction.product_id.clone(), end);
            }
        }
        self.publish();
    }

    /// Record the latest known expiry for a subscription identifier.
    ///
    /// Unconfigured identifiers are ignored, keeping the map's keys within
    /// the configured subscription set.
    pub(crate) fn set_expiration(&mut self, product_id: ProductId, expiration_date: i64) {
        if !self.config.is_subscription(&product_id) {
            return;
        }
        self.expirations.insert(product_id, expiration_date);
        self.publish();
    }

    /// Reset both request classes to `NotStarted`.
    pub(crate) fn reset_request_states(&mut self) {
        self.catalog_state = RequestState::NotStarted;
        self.entitlement_state = RequestState::NotStarted;
        self.publish();
    }

    fn publish(&self) {
        self.watch.send_replace(MirrorSnapshot {
            catalog: self.catalog.clone(),
            purchased: self.purchased.clone(),
            subscription_expirations: self.expirations.clone(),
            catalog_state: self.catalog_state,
            entitlement_state: self.entitlement_state,
        });
    }
}
