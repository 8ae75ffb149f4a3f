#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the socialgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod account;
pub mod callback;
pub mod error;
pub mod handlers;
pub mod pending;
pub mod redirect;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use account::{AccountBridge, AccountIdentity, MemoryAccountDirectory, Profile};
pub use callback::{AuthConfig, CallbackProcessor, RawCallbackRequest, ValidationOutcome};
pub use error::{CallbackError, ConfigError, ValidationFailure};
pub use handlers::configure_services;
pub use pending::{MemoryPendingStore, PendingTargetStore};
pub use redirect::RedirectTarget;
pub use settings::SocialgateSettings;
