//! # Iapkit Entitlement Mirror
//!
//! Maintains an in-process, observable snapshot of which product
//! identifiers the current user owns and, for subscription identifiers,
//! their expiry dates. State is rebuilt from two sources: the store's
//! push feed of verified transaction events, and on-demand reconciliation
//! against the store's current-entitlements snapshot.
//!
//! ## Trust model
//!
//! The store is the sole authority on transaction validity. The mirror
//! branches on the store's verdict ([`iapkit_lib::VerificationResult`]) and
//! never grants entitlement for an unverified transaction. Unverified
//! events on the background feed are logged and dropped so a corrupt event
//! can never halt processing of subsequent ones.
//!
//! ## Writer model
//!
//! All shared-state mutation is routed through a single internal task that
//! drains a command queue; consumer operations and the feed listener only
//! send commands. Store calls are awaited on the caller's task, so an
//! indefinitely suspended store call never stalls state application.

pub mod config;
pub mod mirror;
pub mod state;

pub use config::MirrorConfig;
pub use mirror::{verify, EntitlementMirror};
pub use state::{MirrorSnapshot, RequestKind, RequestState};

use iapkit_lib::{ProductId, StoreError};

/// Common result alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    /// The store could not validate a transaction; no entitlement is
    /// granted for it.
    #[error("transaction verification failed: {0}")]
    FailedVerification(String),
    /// Purchase requested for an identifier outside the fetched catalog.
    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),
    /// Purchase requested for an already-owned product.
    #[error("product already purchased: {0}")]
    DuplicatePurchase(ProductId),
    /// The configured identifier sets are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A store boundary call failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
