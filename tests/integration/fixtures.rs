// tests/integration/fixtures.rs

//! Common test fixtures and data generators
//!
//! **Note:** Some fixtures may not be used in all tests yet,
//! but they are available for use when needed.

use spinelink::config::ConnectionConfig;

/// Common test keys
pub const TEST_KEY1: &str = "test_key_1";
pub const TEST_KEY2: &str = "test_key_2";

/// Common test values
pub const TEST_VALUE1: &str = "test_value_1";
pub const TEST_VALUE2: &str = "test_value_2";

/// Channels used by the subscriber tests
pub const ORDERS: &str = "orders";
pub const ALERTS: &str = "alerts";

/// The error text the store sends for a bad login.
pub const WRONGPASS: &str = "WRONGPASS invalid username-password pair or user is disabled.";

/// Generates a unique name with a prefix
///
/// **Usage:**
/// ```rust
/// for i in 0..10 {
///     let key = unique_key("test", i);
///     ctx.manager.set(&key, "value", 0).await.unwrap();
/// }
/// ```
pub fn unique_key(prefix: &str, id: usize) -> String {
    format!("{}_{}", prefix, id)
}

/// A configuration that logs in as `user`.
pub fn config_for_user(user: &str, password: &str) -> ConnectionConfig {
    ConnectionConfig::default().with_credentials(user, password)
}
