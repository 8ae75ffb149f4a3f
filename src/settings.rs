use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::callback::CallbackTransport;
use crate::error::ConfigError;
use crate::pending::FingerprintStrategy;

/// Upper bound for `security.timeout_seconds` and `pending.ttl_seconds`
pub const MAX_WINDOW_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SocialgateSettings {
    pub application: ApplicationSettings,
    pub site: SiteSettings,
    pub callback: CallbackSettings,
    pub security: SecuritySettings,
    pub pending: PendingSettings,
    pub logging: LoggingSettings,
    pub strategies: Vec<StrategySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Route prefix for every authentication endpoint, e.g. `/wc-api/auth`
    pub path_prefix: String,
    /// Log full payloads on success as well as on failure
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    /// Public base URL of the site the user returns to
    pub base_url: String,
    /// Canonical "my account" page, the default continuation target
    pub my_account_url: String,
    /// Account edit page used when the resolved account has no email
    pub edit_account_url: String,
    pub error_marker: String,
    pub missing_email_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    /// `post` or `get`
    pub transport: String,
    /// Name of the form field / query parameter carrying the payload
    pub payload_field: String,
    /// Largest accepted form-encoded callback body
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Shared salt used to sign callback payloads. Must be persisted.
    pub salt: String,
    /// Environment variable to read the salt from, if set
    pub salt_env: Option<String>,
    pub iteration: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingSettings {
    pub ttl_seconds: u64,
    /// `client` (address + user agent) or `state_token`
    pub fingerprint: String,
    pub state_cookie_name: String,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrategySettings {
    pub name: String,
    pub display_name: Option<String>,
    /// Upstream URL that starts authentication for this strategy
    pub entry_url: String,
    pub enabled: bool,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            path_prefix: "/wc-api/auth".to_string(),
            debug: false,
        }
    }
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            my_account_url: "http://localhost:8080/my-account/".to_string(),
            edit_account_url: "http://localhost:8080/my-account/edit-account/".to_string(),
            error_marker: "error".to_string(),
            missing_email_marker: "missing-email".to_string(),
        }
    }
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self {
            transport: "post".to_string(),
            payload_field: "opauth".to_string(),
            max_payload_bytes: 256 * 1024,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            salt: String::new(), // Will be generated if empty
            salt_env: None,
            iteration: 300,
            timeout_seconds: 120,
        }
    }
}

impl Default for PendingSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            fingerprint: "client".to_string(),
            state_cookie_name: "socialgate_state".to_string(),
            cookie_secure: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SocialgateSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read or parsed
    /// - The resulting settings are invalid (see [`Self::validate`])
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_env_file();

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Self::initialize_logger(&settings.logging)?;
        settings.validate()?;

        Ok(settings)
    }

    /// Initialize `env_logger`, using `logging.level` unless `RUST_LOG` is set
    ///
    /// # Errors
    ///
    /// Returns an error if a logger is already installed
    fn initialize_logger(logging: &LoggingSettings) -> Result<(), log::SetLoggerError> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&logging.level))
            .try_init()
    }

    /// Parse settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// these settings
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// Load base settings from TOML file(s) or use defaults
    /// Settings are loaded with the following priority (highest to lowest):
    /// 1. Environment variables (applied separately after loading base settings)
    /// 2. Settings.toml in `SOCIALGATE_SECRETS_DIR` (if specified and exists)
    /// 3. Settings.toml in current directory (if exists)
    /// 4. Default settings
    fn load_base_settings() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml_file(&default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("SOCIALGATE_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_toml_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ SOCIALGATE_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_site_env_overrides(&mut settings.site);
        Self::apply_callback_env_overrides(&mut settings.callback);
        Self::apply_security_env_overrides(&mut settings.security);
        Self::apply_pending_env_overrides(&mut settings.pending);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(prefix) = std::env::var("PATH_PREFIX") {
            app_settings.path_prefix = prefix;
        }
        if let Ok(debug_str) = std::env::var("SOCIALGATE_DEBUG") {
            if let Ok(debug) = debug_str.parse::<bool>() {
                app_settings.debug = debug;
            }
        }
    }

    fn apply_site_env_overrides(site_settings: &mut SiteSettings) {
        if let Ok(base_url) = std::env::var("SITE_BASE_URL") {
            site_settings.base_url = base_url;
        }
        if let Ok(url) = std::env::var("MY_ACCOUNT_URL") {
            site_settings.my_account_url = url;
        }
        if let Ok(url) = std::env::var("EDIT_ACCOUNT_URL") {
            site_settings.edit_account_url = url;
        }
    }

    fn apply_callback_env_overrides(callback_settings: &mut CallbackSettings) {
        if let Ok(transport) = std::env::var("CALLBACK_TRANSPORT") {
            callback_settings.transport = transport;
        }
        if let Ok(limit_str) = std::env::var("CALLBACK_MAX_PAYLOAD_BYTES") {
            if let Ok(limit) = limit_str.parse::<usize>() {
                callback_settings.max_payload_bytes = limit;
            }
        }
    }

    /// Apply environment overrides for security settings, generating a salt
    /// when none is configured
    pub fn apply_security_env_overrides(security_settings: &mut SecuritySettings) {
        if let Ok(value_str) = std::env::var("SECURITY_ITERATION") {
            if let Ok(value) = value_str.parse::<u32>() {
                security_settings.iteration = value;
            }
        }
        Self::apply_numeric_env_override(
            "SECURITY_TIMEOUT_SECONDS",
            &mut security_settings.timeout_seconds,
        );

        Self::handle_salt_override(security_settings);
    }

    fn apply_pending_env_overrides(pending_settings: &mut PendingSettings) {
        Self::apply_numeric_env_override("PENDING_TTL_SECONDS", &mut pending_settings.ttl_seconds);
        if let Ok(strategy) = std::env::var("FINGERPRINT_STRATEGY") {
            pending_settings.fingerprint = strategy;
        }
        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(cookie_secure) = cookie_secure_str.parse::<bool>() {
                pending_settings.cookie_secure = cookie_secure;
            }
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Salt precedence: `SECURITY_SALT`, then the configured `salt_env`
    /// variable, then the configured value, then a generated one
    fn handle_salt_override(security_settings: &mut SecuritySettings) {
        let from_env = std::env::var("SECURITY_SALT")
            .ok()
            .or_else(|| {
                security_settings
                    .salt_env
                    .as_ref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .filter(|salt| !salt.is_empty());

        if let Some(salt) = from_env {
            security_settings.salt = salt;
        } else if security_settings.salt.is_empty() {
            security_settings.salt = Self::generate_random_salt();
            Self::warn_about_generated_salt();
        }
    }

    /// 32 bytes from the thread-local CSPRNG, base64 encoded
    fn generate_random_salt() -> String {
        use rand::RngCore;
        let mut salt = [0u8; 32];
        rand::rng().fill_bytes(&mut salt);
        general_purpose::STANDARD.encode(salt)
    }

    fn warn_about_generated_salt() {
        eprintln!("⚠️  WARNING: Using auto-generated security salt");
        eprintln!("🔒 For production use, set the SECURITY_SALT environment variable");
        eprintln!("   or configure security.salt in Settings.toml");
        eprintln!("💡 The salt changes on each restart, so in-flight callbacks will fail to validate");
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                if line.trim_start().starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Check values that cannot be expressed by the types alone
    ///
    /// # Errors
    ///
    /// Returns an error if the transport or fingerprint strategy is unknown,
    /// a site URL is not absolute, the iteration count or payload limit is
    /// zero, or a time window exceeds [`MAX_WINDOW_SECONDS`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.callback
            .transport
            .parse::<CallbackTransport>()
            .map_err(|e| ConfigError::Invalid {
                key: "callback.transport",
                reason: e.to_string(),
            })?;

        self.pending
            .fingerprint
            .parse::<FingerprintStrategy>()
            .map_err(|reason| ConfigError::Invalid {
                key: "pending.fingerprint",
                reason,
            })?;

        for (key, value) in [
            ("site.base_url", &self.site.base_url),
            ("site.my_account_url", &self.site.my_account_url),
            ("site.edit_account_url", &self.site.edit_account_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::Invalid {
                key,
                reason: format!("`{value}` is not an absolute URL: {e}"),
            })?;
        }

        if self.security.iteration == 0 {
            return Err(ConfigError::Invalid {
                key: "security.iteration",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.callback.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "callback.max_payload_bytes",
                reason: "must be at least 1".to_string(),
            });
        }

        for (key, value) in [
            ("security.timeout_seconds", self.security.timeout_seconds),
            ("pending.ttl_seconds", self.pending.ttl_seconds),
        ] {
            if value > MAX_WINDOW_SECONDS {
                return Err(ConfigError::Invalid {
                    key,
                    reason: format!(
                        "{value} exceeds the maximum of {MAX_WINDOW_SECONDS} seconds"
                    ),
                });
            }
        }

        Ok(())
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get enabled strategies
    #[must_use]
    pub fn get_enabled_strategies(&self) -> Vec<&StrategySettings> {
        self.strategies.iter().filter(|s| s.enabled).collect()
    }
}
