use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Product, ProductId, PurchaseOutcome, Result, Transaction, VerificationResult};

/// Feed of verification results for transactions not initiated by a local
/// purchase call (external purchases, renewals, refunds).
///
/// The store pushes results in delivery order; a consumer drains them one at
/// a time. `None` means the feed is closed and no further events will arrive.
#[async_trait]
pub trait TransactionUpdates: Send {
    /// Receive the next verification result from the store.
    async fn next(&mut self) -> Option<VerificationResult>;
}

/// Trait describing the platform in-app-purchase surface.
///
/// Implementations adapt a concrete store backend; consumers inject them and
/// must treat the store as the sole authority on catalog contents and
/// transaction validity.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Fetch catalog entries for the given product identifiers.
    ///
    /// Unknown identifiers are omitted from the result, not errors.
    async fn fetch_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Run the purchase flow for a product.
    ///
    /// May suspend indefinitely while the user interacts with the store UI.
    async fn purchase(&self, product: &Product) -> Result<PurchaseOutcome>;

    /// Fetch the most recent transaction for a product identifier, if any.
    async fn latest_transaction(&self, id: &ProductId) -> Result<Option<VerificationResult>>;

    /// Fetch the store's current-entitlements snapshot: the latest
    /// transaction for every product the user is entitled to.
    async fn current_entitlements(&self) -> Result<Vec<VerificationResult>>;

    /// Ask the store to synchronize entitlements with its backend.
    async fn sync(&self) -> Result<()>;

    /// Signal completion of a transaction so the store stops redelivering it.
    async fn finish(&self, transaction: &Transaction) -> Result<()>;

    /// Open the transaction update feed.
    ///
    /// Must be callable before any other operation so a consumer can start
    /// listening without missing events.
    fn updates(&self) -> Box<dyn TransactionUpdates>;
}

/// [`TransactionUpdates`] adapter over a tokio channel.
///
/// Store adapters that receive push events on a channel can hand the
/// receiving half to consumers through this wrapper.
pub struct ChannelUpdates {
    rx: mpsc::UnboundedReceiver<VerificationResult>,
}

impl ChannelUpdates {
    /// Wrap the receiving half of an update channel.
    pub fn new(rx: mpsc::UnboundedReceiver<VerificationResult>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl TransactionUpdates for ChannelUpdates {
    async fn next(&mut self) -> Option<VerificationResult> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;

    #[tokio::test]
    async fn test_channel_updates_delivers_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut feed = ChannelUpdates::new(rx);

        for n in 0..3 {
            let transaction =
                Transaction::new(format!("txn_{n}"), ProductId::new("pro"), 1_700_000_000 + n);
            tx.send(VerificationResult::Verified(transaction)).unwrap();
        }
        drop(tx);

        for n in 0..3 {
            let result = feed.next().await.unwrap();
            assert_eq!(result.transaction().transaction_id, format!("txn_{n}"));
        }
        assert!(feed.next().await.is_none());
    }
}
