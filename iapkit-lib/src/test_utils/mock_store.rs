//! Scriptable in-memory store for exercising consumers end to end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    ChannelUpdates, Product, ProductId, PurchaseOutcome, Result, StoreClient, StoreError,
    Transaction, TransactionUpdates, VerificationResult,
};

/// A simulated store backend for testing.
///
/// Tests register products, script the outcome of each store call, and push
/// transaction events into the update feed. Call counters make guard
/// behavior (at-most-once fetches) observable.
pub struct MockStoreClient {
    products: RwLock<HashMap<ProductId, Product>>,
    purchase_outcomes: RwLock<HashMap<ProductId, PurchaseOutcome>>,
    latest_transactions: RwLock<HashMap<ProductId, VerificationResult>>,
    entitlements: RwLock<Vec<VerificationResult>>,
    fail_fetch: AtomicBool,
    fail_sync: AtomicBool,
    fail_entitlements: AtomicBool,
    fetch_calls: AtomicUsize,
    sync_calls: AtomicUsize,
    entitlement_calls: AtomicUsize,
    finished: Mutex<Vec<String>>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<VerificationResult>>>,
}

impl MockStoreClient {
    /// Create a new mock store with nothing scripted.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            products: RwLock::new(HashMap::new()),
            purchase_outcomes: RwLock::new(HashMap::new()),
            latest_transactions: RwLock::new(HashMap::new()),
            entitlements: RwLock::new(Vec::new()),
            fail_fetch: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            fail_entitlements: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            entitlement_calls: AtomicUsize::new(0),
            finished: Mutex::new(Vec::new()),
            feeds: Mutex::new(Vec::new()),
        })
    }

    /// Make a product available in the catalog.
    pub fn register_product(&self, product: Product) {
        self.products
            .write()
            .unwrap()
            .insert(product.id.clone(), product);
    }

    /// Script the outcome of the next purchase calls for a product.
    pub fn script_purchase(&self, id: ProductId, outcome: PurchaseOutcome) {
        self.purchase_outcomes.write().unwrap().insert(id, outcome);
    }

    /// Script the latest-transaction lookup result for a product.
    pub fn script_latest_transaction(&self, id: ProductId, result: VerificationResult) {
        self.latest_transactions.write().unwrap().insert(id, result);
    }

    /// Script the current-entitlements snapshot.
    pub fn script_entitlements(&self, results: Vec<VerificationResult>) {
        *self.entitlements.write().unwrap() = results;
    }

    /// Make catalog fetches fail with a network error.
    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make backend sync fail with a network error.
    pub fn set_fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Make entitlement snapshot fetches fail with a network error.
    pub fn set_fail_entitlements(&self, fail: bool) {
        self.fail_entitlements.store(fail, Ordering::SeqCst);
    }

    /// Number of catalog fetches performed.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of backend syncs performed.
    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    /// Number of entitlement snapshot fetches performed.
    pub fn entitlement_calls(&self) -> usize {
        self.entitlement_calls.load(Ordering::SeqCst)
    }

    /// Transaction ids the consumer has finished, in call order.
    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    /// Push a verification result into every open update feed.
    pub fn push_update(&self, result: VerificationResult) {
        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain(|tx| tx.send(result.clone()).is_ok());
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Network("simulated store outage".to_string()));
        }
        let products = self.products.read().unwrap();
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn purchase(&self, product: &Product) -> Result<PurchaseOutcome> {
        self.purchase_outcomes
            .read()
            .unwrap()
            .get(&product.id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("purchase script", product.id.as_str()))
    }

    async fn latest_transaction(&self, id: &ProductId) -> Result<Option<VerificationResult>> {
        Ok(self.latest_transactions.read().unwrap().get(id).cloned())
    }

    async fn current_entitlements(&self) -> Result<Vec<VerificationResult>> {
        self.entitlement_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_entitlements.load(Ordering::SeqCst) {
            return Err(StoreError::Network("simulated store outage".to_string()));
        }
        Ok(self.entitlements.read().unwrap().clone())
    }

    async fn sync(&self) -> Result<()> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(StoreError::Network("simulated sync failure".to_string()));
        }
        Ok(())
    }

    async fn finish(&self, transaction: &Transaction) -> Result<()> {
        self.finished
            .lock()
            .unwrap()
            .push(transaction.transaction_id.clone());
        Ok(())
    }

    fn updates(&self) -> Box<dyn TransactionUpdates> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        Box::new(ChannelUpdates::new(rx))
    }
}
