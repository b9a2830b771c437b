//! Iapkit store boundary.
//!
//! This crate intentionally stays stateless and delegates all store access
//! to callers through trait-based dependency injection. It defines the data
//! model for products and transactions, the [`StoreClient`] trait that a
//! platform adapter implements, and the [`TransactionUpdates`] feed of
//! verification results pushed by the store.
//!
//! The store is the sole authority on transaction validity: this crate only
//! carries the store's verdict (see [`VerificationResult`]) and never
//! re-derives verification itself.
//!
//! # Example
//!
//! ```ignore
//! use iapkit_lib::{ProductId, StoreClient};
//!
//! async fn print_catalog(store: &dyn StoreClient) -> iapkit_lib::Result<()> {
//!     let ids = vec![ProductId::new("trial"), ProductId::new("pro")];
//!     for product in store.fetch_products(&ids).await? {
//!         println!("{}: {} {}", product.id, product.price, product.currency);
//!     }
//!     Ok(())
//! }
//! ```

use rust_decimal::Decimal;

pub mod errors;
mod client;

/// Test utilities for exercising store consumers.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{ChannelUpdates, StoreClient, TransactionUpdates};
pub use errors::StoreError;

/// Common result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Identifier for a purchasable product.
///
/// # Example
///
/// ```
/// use iapkit_lib::ProductId;
///
/// // Create from &str
/// let id: ProductId = "pro.monthly".into();
///
/// // Or explicitly
/// let id = ProductId::new("pro.monthly");
///
/// // Access the inner value
/// assert_eq!(id.as_str(), "pro.monthly");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    /// Create a new ProductId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a product is delivered and renewed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProductKind {
    /// One-time purchase that never expires.
    NonConsumable,
    /// Auto-renewable subscription with an expiration date per period.
    AutoRenewable,
}

/// A catalog entry fetched from the store.
///
/// Immutable after fetch; consumers only read it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub display_name: String,
    pub price: Decimal,
    pub currency: String,
    pub kind: ProductKind,
    pub metadata: serde_json::Value,
}

impl Product {
    /// Create a new catalog entry.
    pub fn new(
        id: ProductId,
        display_name: impl Into<String>,
        price: Decimal,
        currency: impl Into<String>,
        kind: ProductKind,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            price,
            currency: currency.into(),
            kind,
            metadata: serde_json::json!({}),
        }
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check if this product is an auto-renewable subscription.
    pub fn is_subscription(&self) -> bool {
        self.kind == ProductKind::AutoRenewable
    }
}

/// A purchase record issued by the store.
///
/// All dates are unix timestamps in seconds.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub product_id: ProductId,
    pub purchase_date: i64,
    pub expiration_date: Option<i64>,
    pub revocation_date: Option<i64>,
}

impl Transaction {
    /// Create a new transaction record.
    pub fn new(
        transaction_id: impl Into<String>,
        product_id: ProductId,
        purchase_date: i64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            product_id,
            purchase_date,
            expiration_date: None,
            revocation_date: None,
        }
    }

    /// Set the subscription expiration date.
    pub fn with_expiration(mut self, expiration_date: i64) -> Self {
        self.expiration_date = Some(expiration_date);
        self
    }

    /// Set the revocation date (refund or entitlement retraction).
    pub fn with_revocation(mut self, revocation_date: i64) -> Self {
        self.revocation_date = Some(revocation_date);
        self
    }

    /// Check if the store has retracted this transaction's entitlement.
    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }

    /// Check if the transaction's subscription period ended before `now`.
    ///
    /// Transactions without an expiration date never expire.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration_date.is_some_and(|end| end <= now)
    }
}

/// The store's verdict on a transaction's signature.
///
/// Produced by the store's own verification machinery; callers branch on the
/// verdict and must never grant entitlement for an unverified transaction.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    /// The store validated the transaction's signature.
    Verified(Transaction),
    /// Validation failed; the payload is still readable but untrusted.
    Unverified { transaction: Transaction, reason: String },
}

impl VerificationResult {
    /// The carried transaction, regardless of verdict.
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Verified(transaction) => transaction,
            Self::Unverified { transaction, .. } => transaction,
        }
    }

    /// Check if the store validated this transaction.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Result of a user-initiated purchase call.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    /// The purchase went through; the verdict still has to be checked.
    Success(VerificationResult),
    /// The user backed out of the purchase flow.
    Cancelled,
    /// The purchase awaits external approval (e.g. ask-to-buy).
    Pending,
}
