//! Test utilities for store consumers.
//!
//! Provides a scriptable in-memory store ([`MockStoreClient`]) and fixture
//! helpers for building products and transactions in tests.
//!
//! # Example
//!
//! ```ignore
//! use iapkit_lib::test_utils::{fixtures, MockStoreClient};
//!
//! let store = MockStoreClient::new();
//! store.register_product(fixtures::product("pro"));
//! store.push_update(fixtures::verified("pro"));
//! ```

mod mock_store;

pub mod fixtures;

pub use mock_store::MockStoreClient;
