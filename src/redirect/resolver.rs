//! Post-authentication destination selection
//!
//! | outcome                    | destination                                 |
//! |----------------------------|---------------------------------------------|
//! | validation failed          | pending target or my-account, error marker  |
//! | valid, account has no email| edit-account, missing-email marker          |
//! | valid                      | pending target or my-account                |
//!
//! The pending entry for the fingerprint is consumed on the first and last
//! rows. After a missing-email login it stays in place so that
//! [`RedirectResolver::resolve_post_update`] can restore it once the account
//! details are complete.

use log::{debug, warn};
use std::fmt;
use url::Url;

use crate::account::AccountIdentity;
use crate::callback::ValidationOutcome;
use crate::pending::{Fingerprint, PendingTargetStore};
use crate::settings::SiteSettings;

const MARKER_VALUE: &str = "true";

/// Final `Location` for the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub location: String,
}

impl RedirectTarget {
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

impl fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

#[derive(Debug, Clone)]
pub struct RedirectResolver {
    my_account_url: String,
    edit_account_url: String,
    error_marker: String,
    missing_email_marker: String,
}

impl RedirectResolver {
    #[must_use]
    pub fn new(my_account_url: &str, edit_account_url: &str) -> Self {
        Self {
            my_account_url: my_account_url.to_string(),
            edit_account_url: edit_account_url.to_string(),
            error_marker: "error".to_string(),
            missing_email_marker: "missing-email".to_string(),
        }
    }

    #[must_use]
    pub fn from_site(site: &SiteSettings) -> Self {
        Self::new(&site.my_account_url, &site.edit_account_url)
            .with_markers(&site.error_marker, &site.missing_email_marker)
    }

    #[must_use]
    pub fn with_markers(mut self, error_marker: &str, missing_email_marker: &str) -> Self {
        self.error_marker = error_marker.to_string();
        self.missing_email_marker = missing_email_marker.to_string();
        self
    }

    #[must_use]
    pub fn my_account_url(&self) -> &str {
        &self.my_account_url
    }

    /// Pick the destination for a processed callback
    #[must_use]
    pub fn resolve(
        &self,
        outcome: &ValidationOutcome,
        identity: Option<&AccountIdentity>,
        store: &dyn PendingTargetStore,
        fingerprint: Option<&Fingerprint>,
    ) -> RedirectTarget {
        let location = if !outcome.valid {
            let pending = take_pending(store, fingerprint);
            let base = pending.as_deref().unwrap_or(&self.my_account_url);
            add_query_flag(base, &self.error_marker)
        } else if identity.is_some_and(|identity| !identity.has_email()) {
            add_query_flag(&self.edit_account_url, &self.missing_email_marker)
        } else {
            take_pending(store, fingerprint).unwrap_or_else(|| self.my_account_url.clone())
        };

        RedirectTarget { location }
    }

    /// Substitute the pending target after an account-details update
    ///
    /// Only a candidate equal to the my-account URL is replaced, and only then
    /// is the pending entry consumed.
    #[must_use]
    pub fn resolve_post_update(
        &self,
        candidate: &str,
        store: &dyn PendingTargetStore,
        fingerprint: Option<&Fingerprint>,
    ) -> String {
        if !self.is_my_account_url(candidate) {
            return candidate.to_string();
        }
        take_pending(store, fingerprint).unwrap_or_else(|| candidate.to_string())
    }

    fn is_my_account_url(&self, candidate: &str) -> bool {
        normalize(candidate) == normalize(&self.my_account_url)
    }
}

/// Store failures are treated as "no pending target"
fn take_pending(
    store: &dyn PendingTargetStore,
    fingerprint: Option<&Fingerprint>,
) -> Option<String> {
    let fingerprint = fingerprint?;
    match store.take(fingerprint) {
        Ok(Some(url)) => {
            debug!("Restoring pending return target for {fingerprint}");
            Some(url)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Pending target lookup failed, using default destination: {e}");
            None
        }
    }
}

fn normalize(url: &str) -> String {
    let normalized = Url::parse(url.trim()).map_or_else(|_| url.trim().to_string(), String::from);
    normalized.trim_end_matches('/').to_string()
}

/// Set `key=true` on `location`, replacing an existing `key`
#[must_use]
pub fn add_query_flag(location: &str, key: &str) -> String {
    let Ok(mut url) = Url::parse(location) else {
        let separator = if location.contains('?') { '&' } else { '?' };
        return format!(
            "{location}{separator}{}={MARKER_VALUE}",
            urlencoding::encode(key)
        );
    };

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != key)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(key, MARKER_VALUE);
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallbackError, ValidationFailure};
    use crate::pending::MemoryPendingStore;
    use chrono::Duration;

    const MY_ACCOUNT: &str = "https://shop.example/my-account/";
    const EDIT_ACCOUNT: &str = "https://shop.example/my-account/edit-account/";

    fn resolver() -> RedirectResolver {
        RedirectResolver::new(MY_ACCOUNT, EDIT_ACCOUNT)
    }

    fn fingerprint() -> Fingerprint {
        Fingerprint::from_client(Some("203.0.113.7"), Some("Mozilla/5.0"))
    }

    fn identity(email: &str) -> AccountIdentity {
        AccountIdentity {
            user_id: "1".to_string(),
            email: email.to_string(),
        }
    }

    fn failed() -> ValidationOutcome {
        ValidationOutcome::from_error(&CallbackError::Validation(
            ValidationFailure::SignatureMismatch,
            "Invalid auth response - Signature does not validate".to_string(),
        ))
    }

    #[test]
    fn test_success_without_pending_target() {
        let store = MemoryPendingStore::new();
        let target = resolver().resolve(
            &ValidationOutcome::success(),
            Some(&identity("a@b.example")),
            &store,
            Some(&fingerprint()),
        );
        assert_eq!(target.location, MY_ACCOUNT);
    }

    #[test]
    fn test_success_restores_and_consumes_pending_target() {
        let store = MemoryPendingStore::new();
        let fp = fingerprint();
        store.put(&fp, "https://shop.example/cart", Duration::minutes(5)).unwrap();

        let target = resolver().resolve(
            &ValidationOutcome::success(),
            Some(&identity("a@b.example")),
            &store,
            Some(&fp),
        );
        assert_eq!(target.location, "https://shop.example/cart");
        assert_eq!(store.take(&fp).unwrap(), None);
    }

    #[test]
    fn test_failure_marks_pending_target() {
        let store = MemoryPendingStore::new();
        let fp = fingerprint();
        store.put(&fp, "https://shop.example/product?id=7", Duration::minutes(5)).unwrap();

        let target = resolver().resolve(&failed(), None, &store, Some(&fp));
        assert_eq!(target.location, "https://shop.example/product?id=7&error=true");
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_failure_without_pending_target() {
        let store = MemoryPendingStore::new();
        let target = resolver().resolve(&failed(), None, &store, None);
        assert_eq!(target.location, format!("{MY_ACCOUNT}?error=true"));
    }

    #[test]
    fn test_missing_email_keeps_pending_target_for_account_update() {
        let store = MemoryPendingStore::new();
        let fp = fingerprint();
        store.put(&fp, "https://shop.example/cart", Duration::minutes(5)).unwrap();

        let target = resolver().resolve(
            &ValidationOutcome::success(),
            Some(&identity("  ")),
            &store,
            Some(&fp),
        );
        assert_eq!(target.location, format!("{EDIT_ACCOUNT}?missing-email=true"));
        assert_eq!(store.len().unwrap(), 1);

        let after_update = resolver().resolve_post_update(MY_ACCOUNT, &store, Some(&fp));
        assert_eq!(after_update, "https://shop.example/cart");
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_custom_markers() {
        let store = MemoryPendingStore::new();
        let resolver = resolver().with_markers("login_failed", "need_email");

        let target = resolver.resolve(&failed(), None, &store, None);
        assert_eq!(target.location, format!("{MY_ACCOUNT}?login_failed=true"));
    }

    #[test]
    fn test_post_update_substitutes_only_my_account() {
        let store = MemoryPendingStore::new();
        let fp = fingerprint();
        store.put(&fp, "https://shop.example/cart", Duration::minutes(5)).unwrap();

        let untouched =
            resolver().resolve_post_update("https://shop.example/orders/", &store, Some(&fp));
        assert_eq!(untouched, "https://shop.example/orders/");
        assert_eq!(store.len().unwrap(), 1);

        let replaced =
            resolver().resolve_post_update("https://shop.example/my-account", &store, Some(&fp));
        assert_eq!(replaced, "https://shop.example/cart");
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_post_update_without_pending_target() {
        let store = MemoryPendingStore::new();
        let location = resolver().resolve_post_update(MY_ACCOUNT, &store, Some(&fingerprint()));
        assert_eq!(location, MY_ACCOUNT);
    }

    #[test]
    fn test_add_query_flag_replaces_existing() {
        assert_eq!(
            add_query_flag("https://shop.example/cart?error=false&x=1", "error"),
            "https://shop.example/cart?x=1&error=true"
        );
        assert_eq!(
            add_query_flag("https://shop.example/cart#top", "error"),
            "https://shop.example/cart?error=true#top"
        );
        assert_eq!(add_query_flag("/relative", "error"), "/relative?error=true");
    }
}
