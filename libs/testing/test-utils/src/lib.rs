//! Shared test utilities for the quote queue
//!
//! This crate provides reusable test infrastructure:
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: Deterministic test data generation (always available)
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Features
//!
//! - `redis` (default): Enables Redis test infrastructure
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["redis"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestDataBuilder, TestRedis};
//!
//! #[tokio::test]
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_redis_test");
//!
//!     let store = RedisStore::new(
//!         redis.connection(),
//!         RedisStoreConfig::new(builder.key_prefix()),
//!     );
//!     store.enqueue(builder.quote(600_000.0), EnqueueOptions::default()).await.unwrap();
//! }
//! ```

use serde_json::{Map, Value, json};
use uuid::Uuid;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_enqueue_quote");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic applicant ID
    pub fn applicant_id(&self) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Key prefix private to this test, so tests can share one Redis
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.key_prefix(), "test_quotes_7");
    /// ```
    pub fn key_prefix(&self) -> String {
        format!("test_quotes_{}", self.seed)
    }

    /// Quote submission payload with the given coverage amount
    ///
    /// The amount sits at `/submission/coverage_amount`.
    pub fn quote(&self, coverage_amount: f64) -> Map<String, Value> {
        let quote = json!({
            "applicant_id": self.applicant_id(),
            "submission": {
                "business_name": format!("Test Business {}", self.seed % 1000),
                "coverage_amount": coverage_amount,
                "line_of_business": "general_liability",
            },
        });
        match quote {
            Value::Object(map) => map,
            _ => unreachable!("json! object literal"),
        }
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.applicant_id(), builder2.applicant_id());
        assert_eq!(builder1.key_prefix(), builder2.key_prefix());
        assert_eq!(builder1.quote(1.0), builder2.quote(1.0));
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.applicant_id(), builder2.applicant_id());
        assert_ne!(builder1.key_prefix(), builder2.key_prefix());
    }

    #[test]
    fn test_quote_has_coverage() {
        let quote = TestDataBuilder::new(1).quote(600_000.0);
        assert_eq!(quote["submission"]["coverage_amount"], 600_000.0);
    }
}
