use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{AccountBridge, AccountError, AccountIdentity, Profile};

type AccountKey = (String, String);

/// In-memory user directory keyed by `(provider, uid)`
///
/// A first login creates the account with whatever email the profile carries.
/// Later logins return the stored identity unchanged.
#[derive(Debug, Default)]
pub struct MemoryAccountDirectory {
    accounts: Mutex<HashMap<AccountKey, AccountIdentity>>,
}

impl MemoryAccountDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<AccountKey, AccountIdentity>>, AccountError> {
        self.accounts
            .lock()
            .map_err(|_| AccountError::Backend("account directory lock poisoned".to_string()))
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn get(&self, provider: &str, uid: &str) -> Result<Option<AccountIdentity>, AccountError> {
        let key = (provider.to_ascii_lowercase(), uid.to_string());
        Ok(self.lock()?.get(&key).cloned())
    }

    /// Set the email of an existing account, returning whether one matched
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn update_email(&self, user_id: &str, email: &str) -> Result<bool, AccountError> {
        let mut accounts = self.lock()?;
        let Some(identity) = accounts.values_mut().find(|a| a.user_id == user_id) else {
            return Ok(false);
        };
        identity.email = email.trim().to_string();
        debug!("Updated email for account {user_id}");
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn len(&self) -> Result<usize, AccountError> {
        Ok(self.lock()?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn is_empty(&self) -> Result<bool, AccountError> {
        Ok(self.lock()?.is_empty())
    }
}

#[async_trait]
impl AccountBridge for MemoryAccountDirectory {
    async fn resolve_account(
        &self,
        provider: &str,
        profile: &Profile,
    ) -> Result<AccountIdentity, AccountError> {
        if profile.uid.is_empty() {
            return Err(AccountError::Rejected("profile has no uid".to_string()));
        }

        let key = (provider.to_ascii_lowercase(), profile.uid.clone());
        let mut accounts = self.lock()?;

        if let Some(existing) = accounts.get(&key) {
            debug!("Matched existing account {} for {}", existing.user_id, provider);
            return Ok(existing.clone());
        }

        let identity = AccountIdentity {
            user_id: Uuid::new_v4().to_string(),
            email: profile.email().unwrap_or_default().to_string(),
        };
        info!(
            "Created account {} for {} profile (email present: {})",
            identity.user_id,
            provider,
            identity.has_email()
        );
        accounts.insert(key, identity.clone());
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(provider: &str, uid: &str, email: Option<&str>) -> Profile {
        let mut auth = json!({"provider": provider, "uid": uid});
        if let Some(email) = email {
            auth["info"] = json!({"email": email});
        }
        Profile::from_auth(provider, uid, auth.as_object().unwrap())
    }

    #[tokio::test]
    async fn test_first_login_creates_account() {
        let directory = MemoryAccountDirectory::new();
        let identity = directory
            .resolve_account("Google", &profile("Google", "42", Some("a@b.example")))
            .await
            .unwrap();

        assert_eq!(identity.email, "a@b.example");
        assert_eq!(directory.len().unwrap(), 1);
        assert_eq!(directory.get("google", "42").unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn test_repeat_login_returns_same_account() {
        let directory = MemoryAccountDirectory::new();
        let first = directory
            .resolve_account("Google", &profile("Google", "42", None))
            .await
            .unwrap();
        let second = directory
            .resolve_account("google", &profile("google", "42", Some("later@b.example")))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(!second.has_email());
    }

    #[tokio::test]
    async fn test_update_email() {
        let directory = MemoryAccountDirectory::new();
        let identity = directory
            .resolve_account("Facebook", &profile("Facebook", "7", None))
            .await
            .unwrap();

        assert!(directory.update_email(&identity.user_id, "new@b.example").unwrap());
        assert!(!directory.update_email("unknown", "x@b.example").unwrap());
        assert_eq!(
            directory.get("facebook", "7").unwrap().unwrap().email,
            "new@b.example"
        );
    }

    #[tokio::test]
    async fn test_empty_uid_rejected() {
        let directory = MemoryAccountDirectory::new();
        let result = directory.resolve_account("Google", &profile("Google", "", None)).await;

        assert!(matches!(result, Err(AccountError::Rejected(_))));
    }
}
