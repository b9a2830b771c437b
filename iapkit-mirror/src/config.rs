//! Mirror configuration: the fixed identifier sets a consumer provides.

use iapkit_lib::ProductId;
use serde::{Deserialize, Serialize};

use crate::{MirrorError, Result};

/// Configuration for an entitlement mirror.
///
/// Identifier sets are immutable for the mirror's lifetime. Persisting
/// purchased identifiers across restarts is the consumer's responsibility;
/// restored identifiers are handed back through `seed_purchased`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// All purchasable product identifiers.
    pub product_ids: Vec<ProductId>,
    /// Auto-renewable subscription identifiers. Must be a subset of
    /// `product_ids`.
    pub subscription_ids: Vec<ProductId>,
    /// Identifiers restored from the consumer's own persistence, used to
    /// seed the purchased set before the first reconciliation.
    pub seed_purchased: Vec<ProductId>,
}

impl MirrorConfig {
    /// Create a configuration with no seeded purchases.
    pub fn new(product_ids: Vec<ProductId>, subscription_ids: Vec<ProductId>) -> Self {
        Self {
            product_ids,
            subscription_ids,
            seed_purchased: Vec::new(),
        }
    }

    /// Seed the purchased set with previously persisted identifiers.
    ///
    /// Identifiers outside `product_ids` are dropped at mirror construction.
    pub fn with_seed_purchased(mut self, seed_purchased: Vec<ProductId>) -> Self {
        self.seed_purchased = seed_purchased;
        self
    }

    /// Check if an identifier is a configured product.
    pub fn is_configured(&self, id: &ProductId) -> bool {
        self.product_ids.contains(id)
    }

    /// Check if an identifier is a configured subscription.
    pub fn is_subscription(&self, id: &ProductId) -> bool {
        self.subscription_ids.contains(id)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        if self.product_ids.is_empty() {
            return Err(MirrorError::InvalidConfig(
                "product identifier set cannot be empty".to_string(),
            ));
        }
        for id in &self.subscription_ids {
            if !self.is_configured(id) {
                return Err(MirrorError::InvalidConfig(format!(
                    "subscription identifier {id} is not a configured product"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<ProductId> {
        raw.iter().map(|id| ProductId::new(*id)).collect()
    }

    #[test]
    fn test_validate_accepts_subscription_subset() {
        let config = MirrorConfig::new(ids(&["trial", "pro"]), ids(&["pro"]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_subscription() {
        let config = MirrorConfig::new(ids(&["trial"]), ids(&["pro"]));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MirrorError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_empty_products() {
        let config = MirrorConfig::new(Vec::new(), Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_membership_helpers() {
        let config = MirrorConfig::new(ids(&["trial", "pro"]), ids(&["pro"]));
        assert!(config.is_configured(&ProductId::new("trial")));
        assert!(!config.is_configured(&ProductId::new("other")));
        assert!(config.is_subscription(&ProductId::new("pro")));
        assert!(!config.is_subscription(&ProductId::new("trial")));
    }
}
