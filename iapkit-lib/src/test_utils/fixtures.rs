//! Fixture helpers for building store data in tests.

use rust_decimal_macros::dec;

use crate::{Product, ProductId, ProductKind, Transaction, VerificationResult};

/// A non-consumable product with a placeholder price.
pub fn product(id: &str) -> Product {
    Product::new(
        ProductId::new(id),
        format!("Test {id}"),
        dec!(4.99),
        "USD",
        ProductKind::NonConsumable,
    )
}

/// An auto-renewable subscription product.
pub fn subscription_product(id: &str) -> Product {
    Product::new(
        ProductId::new(id),
        format!("Test {id}"),
        dec!(9.99),
        "USD",
        ProductKind::AutoRenewable,
    )
}

/// A fresh transaction for a product, purchased now.
pub fn transaction(product_id: &str) -> Transaction {
    Transaction::new(
        uuid::Uuid::new_v4().to_string(),
        ProductId::new(product_id),
        chrono::Utc::now().timestamp(),
    )
}

/// A verified, unrevoked transaction.
pub fn verified(product_id: &str) -> VerificationResult {
    VerificationResult::Verified(transaction(product_id))
}

/// A verified subscription transaction expiring at the given timestamp.
pub fn verified_expiring(product_id: &str, expiration_date: i64) -> VerificationResult {
    VerificationResult::Verified(transaction(product_id).with_expiration(expiration_date))
}

/// A verified transaction revoked now (e.g. refunded).
pub fn revoked(product_id: &str) -> VerificationResult {
    VerificationResult::Verified(
        transaction(product_id).with_revocation(chrono::Utc::now().timestamp()),
    )
}

/// A transaction the store could not validate.
pub fn unverified(product_id: &str, reason: &str) -> VerificationResult {
    VerificationResult::Unverified {
        transaction: transaction(product_id),
        reason: reason.to_string(),
    }
}
