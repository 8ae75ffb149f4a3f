// Centralized logging for the authentication flow
use log::{debug, error, info, warn};

use crate::callback::AuthConfig;
use crate::error::CallbackError;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a rejected callback with the full payload for forensics
    pub fn log_callback_failure(err: &CallbackError, payload: Option<&serde_json::Value>) {
        let response = payload.map_or_else(
            || err.raw_payload().unwrap_or("<unavailable>").to_string(),
            ToString::to_string,
        );
        error!("Error: {err}, Response: {response}");
    }

    /// Log an accepted callback
    pub fn log_callback_success(
        provider: &str,
        user_id: &str,
        debug_payload: Option<&serde_json::Value>,
    ) {
        info!("✅ {provider} login accepted for account {user_id}");
        if let Some(payload) = debug_payload {
            debug!("Callback payload: {payload}");
        }
    }

    /// Log the chosen redirect
    pub fn log_redirect(location: &str, accepted: bool) {
        if accepted {
            info!("↩️  Redirecting to: {location}");
        } else {
            info!("↩️  Redirecting rejected callback to: {location}");
        }
    }

    /// Log authentication start for a strategy
    pub fn log_authentication_start(strategy: &str, stored_target: Option<&str>) {
        match stored_target {
            Some(target) => info!("🔐 Starting {strategy} authentication, return target: {target}"),
            None => info!("🔐 Starting {strategy} authentication without return target"),
        }
    }

    /// Log a pending store failure
    pub fn log_store_failure(operation: &str, err: &dyn std::fmt::Display) {
        warn!("Pending target store {operation} failed: {err}");
    }

    /// Log the configured strategies and their callback URLs
    pub fn log_strategies_summary(config: &AuthConfig) {
        if config.strategies.is_empty() {
            warn!("❌ No authentication strategies enabled");
            return;
        }
        for strategy in &config.strategies {
            info!(
                "✅ {} configured, callback: {}",
                strategy.display_name,
                config.callback_url(&strategy.name)
            );
        }
    }
}
