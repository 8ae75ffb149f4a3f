//! Pending return targets
//!
//! The URL a user was on before authentication started is remembered under a
//! client fingerprint and restored once the provider redirects back.
//!
//! - [`fingerprint`] - Fingerprint derivation (client context or signed state token)
//! - [`store`] - Expiring, consume-once storage of return targets

pub mod fingerprint;
pub mod store;

pub use fingerprint::{ClientContext, Fingerprint, FingerprintStrategy, StateTokenSigner};
pub use store::{MemoryPendingStore, PendingReturnTarget, PendingTargetStore, StoreError};
