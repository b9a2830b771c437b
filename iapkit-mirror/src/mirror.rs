//! The entitlement mirror: single-writer state task, feed listener, and the
//! consumer-facing handle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use iapkit_lib::{
    Product, ProductId, PurchaseOutcome, StoreClient, Transaction, TransactionUpdates,
    VerificationResult,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::state::{EntitlementState, MirrorSnapshot, RequestKind, RequestState};
use crate::{MirrorConfig, MirrorError, Result};

/// Gate function for the store's verification verdict.
///
/// The sole trust boundary: unwraps a verified transaction, fails otherwise.
/// The mirror never re-derives verification itself.
pub fn verify(result: VerificationResult) -> Result<Transaction> {
    match result {
        VerificationResult::Verified(transaction) => Ok(transaction),
        VerificationResult::Unverified { reason, .. } => {
            Err(MirrorError::FailedVerification(reason))
        }
    }
}

/// Commands applied by the writer task, one at a time, in send order.
enum Command {
    Begin {
        kind: RequestKind,
        reply: oneshot::Sender<bool>,
    },
    CompleteCatalog {
        products: Vec<Product>,
        reply: oneshot::Sender<()>,
    },
    ReplacePurchased {
        entitled: HashSet<ProductId>,
        reply: oneshot::Sender<()>,
    },
    Apply {
        transaction: Transaction,
        reply: oneshot::Sender<()>,
    },
    RecordPurchase {
        transaction: Transaction,
        reply: oneshot::Sender<()>,
    },
    SetExpiration {
        product_id: ProductId,
        expiration_date: i64,
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

/// Shared internals: everything an operation needs to talk to the store and
/// the writer task.
#[derive(Clone)]
struct Inner {
    store: Arc<dyn StoreClient>,
    config: Arc<MirrorConfig>,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<MirrorSnapshot>,
}

impl Inner {
    /// Claim a request class on the writer task.
    ///
    /// Returns false when already claimed or completed, or when the mirror
    /// has shut down.
    async fn begin(&self, kind: RequestKind) -> bool {
        let (reply, ack) = oneshot::channel();
        if self.commands.send(Command::Begin { kind, reply }).is_err() {
            return false;
        }
        ack.await.unwrap_or(false)
    }

    /// Send a mutation and wait until the writer task has applied it, so an
    /// operation's effects are visible once it returns.
    async fn execute(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (reply, ack) = oneshot::channel();
        if self.commands.send(make(reply)).is_ok() {
            let _ = ack.await;
        }
    }

    async fn fetch_catalog(&self) {
        if !self.begin(RequestKind::Catalog).await {
            return;
        }
        match self.store.fetch_products(&self.config.product_ids).await {
            Ok(products) => {
                self.execute(|reply| Command::CompleteCatalog { products, reply })
                    .await;
            }
            Err(err) => {
                // Deliberately stays InProgress; see reset_request_state.
                tracing::warn!("product catalog fetch failed: {}", err);
            }
        }
    }

    async fn reconcile_purchases(&self, force_sync: bool) {
        if !self.begin(RequestKind::Entitlements).await {
            return;
        }
        if force_sync {
            if let Err(err) = self.store.sync().await {
                tracing::warn!("store sync failed, reconciling from cache: {}", err);
            }
        }
        match self.store.current_entitlements().await {
            Ok(results) => {
                let mut entitled = HashSet::new();
                for result in results {
                    match verify(result) {
                        Ok(transaction) if !transaction.is_revoked() => {
                            entitled.insert(transaction.product_id);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::warn!("skipping unverifiable entitlement: {}", err);
                        }
                    }
                }
                self.execute(|reply| Command::ReplacePurchased { entitled, reply })
                    .await;
            }
            Err(err) => {
                tracing::warn!("entitlement snapshot fetch failed: {}", err);
            }
        }
    }

    async fn update_subscription_info(&self) {
        let catalog = self.snapshot.borrow().catalog.clone();
        for id in &self.config.subscription_ids {
            if !catalog.iter().any(|product| product.id == *id) {
                continue;
            }
            let result = match self.store.latest_transaction(id).await {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!("latest transaction lookup failed for {}: {}", id, err);
                    continue;
                }
            };
            match verify(result) {
                Ok(transaction) => {
                    if let Some(expiration_date) = transaction.expiration_date {
                        let product_id = id.clone();
                        self.execute(|reply| Command::SetExpiration {
                            product_id,
                            expiration_date,
                            reply,
                        })
                        .await;
                    }
                }
                Err(err) => {
                    tracing::debug!("skipping unverified latest transaction for {}: {}", id, err);
                }
            }
        }
    }

    async fn purchase(&self, product_id: &ProductId) -> Result<Option<Transaction>> {
        let product = {
            let snapshot = self.snapshot.borrow();
            let product = snapshot
                .product(product_id)
                .cloned()
                .ok_or_else(|| MirrorError::UnknownProduct(product_id.clone()))?;
            if snapshot.is_purchased(product_id) {
                return Err(MirrorError::DuplicatePurchase(product_id.clone()));
            }
            product
        };

        match self.store.purchase(&product).await? {
            PurchaseOutcome::Success(result) => {
                let transaction = verify(result)?;
                self.execute(|reply| Command::RecordPurchase {
                    transaction: transaction.clone(),
                    reply,
                })
                .await;
                if let Err(err) = self.store.finish(&transaction).await {
                    tracing::warn!(
                        "failed to finish transaction {}: {}",
                        transaction.transaction_id,
                        err
                    );
                }
                Ok(Some(transaction))
            }
            PurchaseOutcome::Cancelled | PurchaseOutcome::Pending => Ok(None),
        }
    }
}

/// Observable mirror of purchase and subscription entitlements.
///
/// Construction starts the transaction-feed listener immediately, then runs
/// the bootstrap sequence (catalog fetch, reconciliation, subscription
/// refresh) in the background. Dropping the mirror cancels both internal
/// tasks.
pub struct EntitlementMirror {
    inner: Inner,
    writer: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl EntitlementMirror {
    /// Validate the configuration, spawn the internal tasks, and kick off
    /// the bootstrap sequence.
    ///
    /// Must be called from within a tokio runtime. The update feed is
    /// consumed from the moment this returns, so no event is missed while
    /// the bootstrap completes.
    pub fn spawn(config: MirrorConfig, store: Arc<dyn StoreClient>) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let (watch_tx, watch_rx) = watch::channel(MirrorSnapshot::default());
        let state = EntitlementState::new(config.clone(), watch_tx);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let feed = store.updates();
        let inner = Inner {
            store,
            config,
            commands,
            snapshot: watch_rx,
        };

        let writer = tokio::spawn(run_writer(state, command_rx));
        let listener = tokio::spawn(run_listener(feed, inner.clone()));

        let bootstrap = inner.clone();
        tokio::spawn(async move {
            bootstrap.fetch_catalog().await;
            bootstrap.reconcile_purchases(false).await;
            bootstrap.update_subscription_info().await;
        });

        Ok(Self {
            inner,
            writer,
            listener,
        })
    }

    /// Fetch the product catalog for the configured identifiers.
    ///
    /// At most one underlying fetch is performed per request-state cycle;
    /// repeat calls are no-ops until [`reset_request_state`] is called.
    /// Failures are logged and leave the request state `InProgress`;
    /// inspect [`request_state`] rather than expecting an error.
    ///
    /// [`reset_request_state`]: Self::reset_request_state
    /// [`request_state`]: Self::request_state
    pub async fn fetch_catalog(&self) {
        self.inner.fetch_catalog().await;
    }

    /// Purchase a product from the fetched catalog.
    ///
    /// Returns the verified transaction on success, or `None` when the user
    /// cancelled or the purchase is pending external approval. The
    /// transaction is finished with the store so it is not redelivered.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::UnknownProduct`] if the identifier is not in the
    ///   fetched catalog.
    /// - [`MirrorError::DuplicatePurchase`] if the product is already owned.
    /// - [`MirrorError::FailedVerification`] if the store could not validate
    ///   the resulting transaction.
    /// - [`MirrorError::Store`] if the purchase call itself fails.
    pub async fn purchase(&self, product_id: &ProductId) -> Result<Option<Transaction>> {
        self.inner.purchase(product_id).await
    }

    /// Rebuild the purchased set from the store's current entitlements.
    ///
    /// A full replace: identifiers with no unrevoked verified transaction in
    /// the snapshot are dropped. With `force_sync`, asks the store to sync
    /// with its backend first (best-effort). Guarded like
    /// [`fetch_catalog`](Self::fetch_catalog).
    pub async fn reconcile_purchases(&self, force_sync: bool) {
        self.inner.reconcile_purchases(force_sync).await;
    }

    /// Refresh expiry dates for configured subscriptions present in the
    /// catalog, from each one's latest verified transaction.
    ///
    /// Identifiers with no transaction, an unverified one, or one without an
    /// expiry are skipped silently.
    pub async fn update_subscription_info(&self) {
        self.inner.update_subscription_info().await;
    }

    /// Reset both request-state flags to `NotStarted`, enabling a retry
    /// after a failed or stale fetch.
    pub async fn reset_request_state(&self) {
        self.inner
            .execute(|reply| Command::Reset { reply })
            .await;
    }

    /// Current point-in-time snapshot of all observable state.
    pub fn snapshot(&self) -> MirrorSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Watch channel delivering a fresh snapshot after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<MirrorSnapshot> {
        self.inner.snapshot.clone()
    }

    /// The fetched product catalog (empty until the first successful fetch).
    pub fn catalog(&self) -> Vec<Product> {
        self.inner.snapshot.borrow().catalog.clone()
    }

    /// Product identifiers currently entitled.
    pub fn purchased(&self) -> HashSet<ProductId> {
        self.inner.snapshot.borrow().purchased.clone()
    }

    /// Check if a product is currently entitled.
    pub fn is_purchased(&self, id: &ProductId) -> bool {
        self.inner.snapshot.borrow().is_purchased(id)
    }

    /// Known expiry timestamps per subscription identifier.
    pub fn subscription_expirations(&self) -> HashMap<ProductId, i64> {
        self.inner.snapshot.borrow().subscription_expirations.clone()
    }

    /// Known expiry timestamp for a subscription identifier.
    pub fn expiration(&self, id: &ProductId) -> Option<i64> {
        self.inner.snapshot.borrow().expiration(id)
    }

    /// Check if a subscription's known expiry lies in the future.
    pub fn is_subscription_active(&self, id: &ProductId) -> bool {
        self.inner
            .snapshot
            .borrow()
            .is_subscription_active(id, chrono::Utc::now().timestamp())
    }

    /// State of the given request class.
    pub fn request_state(&self, kind: RequestKind) -> RequestState {
        self.inner.snapshot.borrow().request_state(kind)
    }

    /// The configuration this mirror was constructed with.
    pub fn config(&self) -> &MirrorConfig {
        &self.inner.config
    }

    /// Stop the feed listener and the writer task.
    ///
    /// After shutdown the snapshot stays readable but no further updates are
    /// applied. Dropping the mirror has the same effect.
    pub fn shutdown(&self) {
        self.listener.abort();
        self.writer.abort();
    }
}

impl Drop for EntitlementMirror {
    fn drop(&mut self) {
        self.listener.abort();
        self.writer.abort();
    }
}

/// The single writer: owns the state, applies commands in send order.
async fn run_writer(mut state: EntitlementState, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Begin { kind, reply } => {
                let _ = reply.send(state.begin(kind));
            }
            Command::CompleteCatalog { products, reply } => {
                state.complete_catalog(products);
                let _ = reply.send(());
            }
            Command::ReplacePurchased { entitled, reply } => {
                state.replace_purchased(entitled);
                let _ = reply.send(());
            }
            Command::Apply { transaction, reply } => {
                state.apply(&transaction);
                let _ = reply.send(());
            }
            Command::RecordPurchase { transaction, reply } => {
                state.record_purchase(&transaction);
                let _ = reply.send(());
            }
            Command::SetExpiration {
                product_id,
                expiration_date,
                reply,
            } => {
                state.set_expiration(product_id, expiration_date);
                let _ = reply.send(());
            }
            Command::Reset { reply } => {
                state.reset_request_states();
                let _ = reply.send(());
            }
        }
    }
}

/// Drains the store's update feed for the mirror's entire lifetime, one
/// event at a time, in delivery order.
///
/// Unverified events are logged and dropped; they must never halt the
/// listener. Verified ones are applied and then finished with the store.
async fn run_listener(mut feed: Box<dyn TransactionUpdates>, inner: Inner) {
    while let Some(result) = feed.next().await {
        let transaction_id = result.transaction().transaction_id.clone();
        match verify(result) {
            Ok(transaction) => {
                inner
                    .execute(|reply| Command::Apply {
                        transaction: transaction.clone(),
                        reply,
                    })
                    .await;
                if let Err(err) = inner.store.finish(&transaction).await {
                    tracing::warn!(
                        "failed to finish transaction {}: {}",
                        transaction.transaction_id,
                        err
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    "dropping transaction {} from update feed: {}",
                    transaction_id,
                    err
                );
            }
        }
    }
    tracing::debug!("transaction update feed closed");
}
