//! Local account resolution for verified provider profiles
//!
//! The core never creates users itself. It hands a [`Profile`] to an
//! [`AccountBridge`] and only needs the resulting identity's email to pick a
//! redirect.

pub mod memory;

pub use memory::MemoryAccountDirectory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Provider profile extracted from a validated `auth` object
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Lower-cased provider identifier
    pub provider: String,
    pub uid: String,
    /// The complete `auth` object as received
    pub attributes: Map<String, Value>,
}

impl Profile {
    #[must_use]
    pub fn from_auth(provider: &str, uid: &str, auth: &Map<String, Value>) -> Self {
        Self {
            provider: provider.trim().to_ascii_lowercase(),
            uid: uid.to_string(),
            attributes: auth.clone(),
        }
    }

    /// Email from `info.email`, falling back to a top-level `email`
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.attributes
            .get("info")
            .and_then(|info| info.get("email"))
            .or_else(|| self.attributes.get("email"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// A local user as seen by the redirect logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    pub user_id: String,
    /// May be empty when the provider did not share an email
    pub email: String,
}

impl AccountIdentity {
    #[must_use]
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account rejected: {0}")]
    Rejected(String),
    #[error("account backend unavailable: {0}")]
    Backend(String),
}

/// Login-or-link against the host application's user directory
#[async_trait]
pub trait AccountBridge: Send + Sync {
    /// Find or create the local account for a verified profile
    ///
    /// `provider` is the lower-cased provider identifier, equal to
    /// `profile.provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the account cannot be resolved
    async fn resolve_account(
        &self,
        provider: &str,
        profile: &Profile,
    ) -> Result<AccountIdentity, AccountError>;
}
