//! Test helpers shared by unit tests and, with the `testing` feature, by
//! downstream crates
//!
//! - [`fixtures`] - Settings, processors and signed callback payloads

pub mod fixtures;

pub use fixtures::{CallbackPayloadBuilder, TestFixtures};

/// Shared salt used by every fixture
pub const TEST_SALT: &str = "test-security-salt";
pub const TEST_SITE: &str = "https://shop.example";
pub const TEST_CLIENT_IP: &str = "203.0.113.7";
pub const TEST_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64)";
