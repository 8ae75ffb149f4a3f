//! Expiring storage of pending return targets
//!
//! At most one live entry exists per fingerprint; storing a new target replaces
//! the previous one. [`PendingTargetStore::take`] is an atomic get-and-delete,
//! so two callbacks sharing a fingerprint cannot both observe the same target.
//! Expired entries are never returned, whether or not they were evicted yet.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::fingerprint::Fingerprint;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pending target store lock poisoned")]
    Poisoned,
}

/// A URL to restore after authentication, valid until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReturnTarget {
    pub fingerprint: Fingerprint,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl PendingReturnTarget {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Keyed TTL storage with consume-once reads
///
/// Backends whose native API only offers a separate get and delete may
/// implement `take` as get-then-delete. A concurrent second callback from an
/// identical fingerprint can then briefly observe or lose the target.
pub trait PendingTargetStore: Send + Sync {
    /// Store `url` for `fingerprint`, replacing any existing entry
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    fn put(&self, fingerprint: &Fingerprint, url: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove the entry for `fingerprint` and return its URL if it was live
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    fn take(&self, fingerprint: &Fingerprint) -> Result<Option<String>, StoreError>;

    /// Evict every expired entry, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// In-process store backed by a mutex-guarded map
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    entries: Mutex<HashMap<Fingerprint, PendingReturnTarget>>,
}

impl MemoryPendingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<Fingerprint, PendingReturnTarget>>, StoreError> {
        self.entries.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of physically present entries, expired ones included
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn take_at(
        &self,
        fingerprint: &Fingerprint,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, StoreError> {
        let removed = self.lock()?.remove(fingerprint);

        Ok(match removed {
            Some(target) if target.is_expired_at(now) => {
                debug!("Discarding expired return target for {fingerprint}");
                None
            }
            Some(target) => Some(target.url),
            None => None,
        })
    }
}

impl PendingTargetStore for MemoryPendingStore {
    fn put(&self, fingerprint: &Fingerprint, url: &str, ttl: Duration) -> Result<(), StoreError> {
        let target = PendingReturnTarget {
            fingerprint: fingerprint.clone(),
            url: url.to_string(),
            expires_at: Utc::now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.lock()?.insert(fingerprint.clone(), target);
        Ok(())
    }

    fn take(&self, fingerprint: &Fingerprint) -> Result<Option<String>, StoreError> {
        self.take_at(fingerprint, Utc::now())
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, target| !target.is_expired_at(now));
        Ok(before - entries.len())
    }
}
