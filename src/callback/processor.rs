//! Callback orchestration
//!
//! Decode, validate, resolve the local account, then choose the redirect.
//! Every failure on the way ends in an error-marked redirect; nothing here
//! returns an error to the HTTP layer.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::config::AuthConfig;
use super::decoder::{CallbackDecoder, CallbackResponse, RawCallbackRequest};
use super::validator::{ResponseValidator, ValidationOutcome, UNKNOWN_PROVIDER_REASON};
use crate::account::{AccountBridge, AccountIdentity, Profile};
use crate::error::{CallbackError, ConfigError, StartError, ValidationFailure};
use crate::pending::{
    ClientContext, Fingerprint, FingerprintStrategy, PendingTargetStore, StateTokenSigner,
};
use crate::redirect::{RedirectResolver, RedirectTarget, ReturnTargetPolicy};
use crate::settings::SocialgateSettings;
use crate::utils::logging::LoggingHelper;

/// Where to send the browser to begin authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationStart {
    pub location: String,
    /// Value for the state cookie under the state-token strategy
    pub state_token: Option<String>,
    /// The validated return target that was stored, if any
    pub stored_target: Option<String>,
}

struct RejectedCallback {
    error: CallbackError,
    payload: Option<Value>,
}

pub struct CallbackProcessor {
    config: AuthConfig,
    decoder: CallbackDecoder,
    validator: ResponseValidator,
    resolver: RedirectResolver,
    policy: ReturnTargetPolicy,
    signer: StateTokenSigner,
    store: Arc<dyn PendingTargetStore>,
    accounts: Arc<dyn AccountBridge>,
}

impl CallbackProcessor {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        resolver: RedirectResolver,
        policy: ReturnTargetPolicy,
        store: Arc<dyn PendingTargetStore>,
        accounts: Arc<dyn AccountBridge>,
    ) -> Self {
        Self {
            decoder: CallbackDecoder::new(config.callback_transport, &config.payload_field),
            validator: ResponseValidator::new(
                &config.security_salt,
                config.security_iteration,
                config.security_timeout,
            ),
            signer: StateTokenSigner::new(&config.security_salt),
            config,
            resolver,
            policy,
            store,
            accounts,
        }
    }

    /// Build from settings, wiring in the given store and account bridge
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid
    pub fn from_settings(
        settings: &SocialgateSettings,
        store: Arc<dyn PendingTargetStore>,
        accounts: Arc<dyn AccountBridge>,
    ) -> Result<Self, ConfigError> {
        let config = AuthConfig::from_settings(settings)?;
        let site = Url::parse(&settings.site.base_url).map_err(|e| ConfigError::Invalid {
            key: "site.base_url",
            reason: e.to_string(),
        })?;

        Ok(Self::new(
            config,
            RedirectResolver::from_site(&settings.site),
            ReturnTargetPolicy::new(site),
            store,
            accounts,
        ))
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Fingerprint for a request under the configured strategy
    #[must_use]
    pub fn fingerprint(&self, client: &ClientContext) -> Option<Fingerprint> {
        self.config.fingerprint.derive(client, &self.signer)
    }

    /// Process a provider callback and decide where the browser goes next
    pub async fn handle_callback(&self, raw: &RawCallbackRequest) -> RedirectTarget {
        let fingerprint = self.fingerprint(&raw.client);

        let (outcome, identity) = match self.authenticate(raw).await {
            Ok(identity) => (ValidationOutcome::success(), Some(identity)),
            Err(rejected) => {
                LoggingHelper::log_callback_failure(&rejected.error, rejected.payload.as_ref());
                (ValidationOutcome::from_error(&rejected.error), None)
            }
        };

        let target = self.resolver.resolve(
            &outcome,
            identity.as_ref(),
            self.store.as_ref(),
            fingerprint.as_ref(),
        );
        LoggingHelper::log_redirect(&target.location, outcome.valid);
        target
    }

    async fn authenticate(
        &self,
        raw: &RawCallbackRequest,
    ) -> Result<AccountIdentity, RejectedCallback> {
        let payload = self.decoder.decode(raw).map_err(|error| RejectedCallback {
            error,
            payload: None,
        })?;
        let reject = |error: CallbackError| RejectedCallback {
            error,
            payload: Some(payload.clone()),
        };

        let response = CallbackResponse::from_payload(&payload).map_err(reject)?;
        let validated = self
            .validator
            .check_at(&response, Utc::now())
            .map_err(reject)?;
        self.check_provider(validated.provider, raw.strategy.as_deref())
            .map_err(reject)?;
        let profile =
            Profile::from_auth(validated.provider, &validated.uid_text(), validated.auth);

        let identity = self
            .accounts
            .resolve_account(&profile.provider, &profile)
            .await
            .map_err(|e| reject(CallbackError::AccountResolution(e.to_string())))?;

        LoggingHelper::log_callback_success(
            &profile.provider,
            &identity.user_id,
            self.config.debug.then_some(&payload),
        );
        Ok(identity)
    }

    /// The provider must be an enabled strategy and, when the callback was
    /// routed by strategy, the same one
    fn check_provider(&self, provider: &str, routed: Option<&str>) -> Result<(), CallbackError> {
        let accepted = self
            .config
            .strategy(provider.trim())
            .is_some_and(|strategy| {
                routed.is_none_or(|name| strategy.name.eq_ignore_ascii_case(name))
            });

        if accepted {
            Ok(())
        } else {
            Err(CallbackError::Validation(
                ValidationFailure::UnknownProvider,
                UNKNOWN_PROVIDER_REASON.to_string(),
            ))
        }
    }

    /// Remember where the user came from and point them at the strategy
    ///
    /// An invalid or off-site `return_url` is dropped and authentication
    /// still starts. Store failures are logged and likewise not fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if the strategy is unknown or disabled
    pub fn begin_authentication(
        &self,
        strategy: &str,
        return_url: Option<&str>,
        client: &ClientContext,
    ) -> Result<AuthenticationStart, StartError> {
        let entry = self
            .config
            .strategy(strategy)
            .ok_or_else(|| StartError::UnknownStrategy(strategy.to_string()))?;

        let (fingerprint, state_token) = match self.config.fingerprint {
            FingerprintStrategy::ClientContext => (
                Fingerprint::from_client(client.client_ip.as_deref(), client.user_agent.as_deref()),
                None,
            ),
            FingerprintStrategy::StateToken => {
                let (token, nonce) = self.signer.issue();
                (Fingerprint::from_state_nonce(&nonce), Some(token))
            }
        };

        if let Err(e) = self.store.purge_expired() {
            LoggingHelper::log_store_failure("purge", &e);
        }

        let stored_target = return_url
            .and_then(|candidate| self.policy.validate(candidate).ok())
            .and_then(|target| {
                match self.store.put(&fingerprint, &target, self.config.pending_ttl) {
                    Ok(()) => Some(target),
                    Err(e) => {
                        LoggingHelper::log_store_failure("put", &e);
                        None
                    }
                }
            });

        LoggingHelper::log_authentication_start(&entry.name, stored_target.as_deref());
        Ok(AuthenticationStart {
            location: entry.entry_url.clone(),
            state_token,
            stored_target,
        })
    }

    /// Redirect after the user saved their account details
    ///
    /// An off-site or malformed candidate is replaced by the my-account URL
    /// before substitution.
    #[must_use]
    pub fn resolve_post_update_redirect(&self, candidate: &str, client: &ClientContext) -> String {
        let candidate = self
            .policy
            .validate(candidate)
            .unwrap_or_else(|_| self.resolver.my_account_url().to_string());
        let fingerprint = self.fingerprint(client);
        self.resolver
            .resolve_post_update(&candidate, self.store.as_ref(), fingerprint.as_ref())
    }
}
