use chrono::Duration;
use url::Url;

use super::decoder::CallbackTransport;
use crate::error::ConfigError;
use crate::pending::FingerprintStrategy;
use crate::settings::SocialgateSettings;

/// A provider strategy users can start authentication with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    pub name: String,
    pub display_name: String,
    pub entry_url: String,
}

/// Resolved authentication configuration, built once at startup
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// `scheme://host[:port]` of the site
    pub host: String,
    /// Site path plus the auth prefix, always ending in `/`
    pub path: String,
    pub callback_transport: CallbackTransport,
    pub payload_field: String,
    pub security_salt: String,
    pub security_iteration: u32,
    pub security_timeout: Duration,
    pub pending_ttl: Duration,
    pub fingerprint: FingerprintStrategy,
    pub state_cookie_name: String,
    pub cookie_secure: bool,
    pub strategies: Vec<StrategyConfig>,
    pub debug: bool,
}

impl AuthConfig {
    /// Build from validated settings
    ///
    /// # Errors
    ///
    /// Returns an error if the settings fail validation
    pub fn from_settings(settings: &SocialgateSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let site = Url::parse(&settings.site.base_url).map_err(|e| ConfigError::Invalid {
            key: "site.base_url",
            reason: e.to_string(),
        })?;
        let host = match (site.host_str(), site.port()) {
            (Some(name), Some(port)) => format!("{}://{name}:{port}", site.scheme()),
            (Some(name), None) => format!("{}://{name}", site.scheme()),
            (None, _) => {
                return Err(ConfigError::Invalid {
                    key: "site.base_url",
                    reason: "URL has no host".to_string(),
                })
            }
        };

        let prefix = settings.application.path_prefix.trim_matches('/');
        let site_path = site.path().trim_end_matches('/');
        let path = if prefix.is_empty() {
            format!("{site_path}/")
        } else {
            format!("{site_path}/{prefix}/")
        };

        // Both parses are checked by validate() above
        let callback_transport = settings
            .callback
            .transport
            .parse()
            .unwrap_or_default();
        let fingerprint = settings.pending.fingerprint.parse().unwrap_or_default();

        let strategies = settings
            .get_enabled_strategies()
            .into_iter()
            .map(|s| StrategyConfig {
                name: s.name.clone(),
                display_name: s.display_name.clone().unwrap_or_else(|| s.name.clone()),
                entry_url: s.entry_url.clone(),
            })
            .collect();

        Ok(Self {
            host,
            path,
            callback_transport,
            payload_field: settings.callback.payload_field.clone(),
            security_salt: settings.security.salt.clone(),
            security_iteration: settings.security.iteration,
            security_timeout: seconds(settings.security.timeout_seconds),
            pending_ttl: seconds(settings.pending.ttl_seconds),
            fingerprint,
            state_cookie_name: settings.pending.state_cookie_name.clone(),
            cookie_secure: settings.pending.cookie_secure,
            strategies,
            debug: settings.application.debug,
        })
    }

    /// Case-insensitive strategy lookup
    #[must_use]
    pub fn strategy(&self, name: &str) -> Option<&StrategyConfig> {
        self.strategies
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Absolute callback URL a provider should return to for `strategy`
    #[must_use]
    pub fn callback_url(&self, strategy: &str) -> String {
        format!(
            "{}{}{}/callback",
            self.host,
            self.path,
            strategy.to_ascii_lowercase()
        )
    }
}

/// Saturates at the largest representable duration
fn seconds(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::StrategySettings;

    fn settings() -> SocialgateSettings {
        let mut settings = SocialgateSettings::default();
        settings.site.base_url = "https://shop.example:8443/store/".to_string();
        settings.security.salt = "salt".to_string();
        settings.strategies = vec![
            StrategySettings {
                name: "google".to_string(),
                display_name: Some("Google".to_string()),
                entry_url: "https://auth.example/google".to_string(),
                enabled: true,
            },
            StrategySettings {
                name: "twitter".to_string(),
                display_name: None,
                entry_url: "https://auth.example/twitter".to_string(),
                enabled: false,
            },
        ];
        settings
    }

    #[test]
    fn test_host_and_path() {
        let config = AuthConfig::from_settings(&settings()).unwrap();

        assert_eq!(config.host, "https://shop.example:8443");
        assert_eq!(config.path, "/store/wc-api/auth/");
        assert_eq!(
            config.callback_url("Google"),
            "https://shop.example:8443/store/wc-api/auth/google/callback"
        );
    }

    #[test]
    fn test_defaults_carried_over() {
        let config = AuthConfig::from_settings(&settings()).unwrap();

        assert_eq!(config.callback_transport, CallbackTransport::Post);
        assert_eq!(config.payload_field, "opauth");
        assert_eq!(config.security_iteration, 300);
        assert_eq!(config.security_timeout, Duration::seconds(120));
        assert_eq!(config.fingerprint, FingerprintStrategy::ClientContext);
    }

    #[test]
    fn test_only_enabled_strategies() {
        let config = AuthConfig::from_settings(&settings()).unwrap();

        assert_eq!(config.strategies.len(), 1);
        assert_eq!(config.strategy("GOOGLE").unwrap().display_name, "Google");
        assert!(config.strategy("twitter").is_none());
    }

    #[test]
    fn test_seconds_saturates() {
        assert_eq!(seconds(120), Duration::seconds(120));
        assert_eq!(seconds(u64::MAX), Duration::MAX);
        assert_eq!(seconds(u64::try_from(i64::MAX).unwrap()), Duration::MAX);
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let mut settings = settings();
        settings.security.timeout_seconds = u64::MAX;

        let err = AuthConfig::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("security.timeout_seconds"));
    }

    #[test]
    fn test_unknown_transport_rejected() {
        let mut settings = settings();
        settings.callback.transport = "session".to_string();

        let err = AuthConfig::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("unsupported transport callback"));
    }
}
