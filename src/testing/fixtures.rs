//! Pre-built test objects

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{TEST_CLIENT_IP, TEST_SALT, TEST_SITE, TEST_USER_AGENT};
use crate::account::MemoryAccountDirectory;
use crate::callback::{encode_payload, sign_auth, CallbackProcessor, RawCallbackRequest};
use crate::pending::{ClientContext, MemoryPendingStore};
use crate::settings::{SocialgateSettings, StrategySettings};

pub struct TestFixtures;

impl TestFixtures {
    /// Settings for `https://shop.example` with a Google strategy
    #[must_use]
    pub fn settings() -> SocialgateSettings {
        let mut settings = SocialgateSettings::default();
        settings.site.base_url = format!("{TEST_SITE}/");
        settings.site.my_account_url = format!("{TEST_SITE}/my-account/");
        settings.site.edit_account_url = format!("{TEST_SITE}/my-account/edit-account/");
        settings.security.salt = TEST_SALT.to_string();
        settings.strategies = vec![StrategySettings {
            name: "google".to_string(),
            display_name: Some("Google".to_string()),
            entry_url: "https://auth.example/google/start".to_string(),
            enabled: true,
        }];
        settings
    }

    /// Processor over fresh in-memory stores, returned alongside them
    ///
    /// # Panics
    ///
    /// Panics if the fixture settings are invalid
    #[must_use]
    pub fn processor_with(
        settings: &SocialgateSettings,
    ) -> (CallbackProcessor, Arc<MemoryPendingStore>, Arc<MemoryAccountDirectory>) {
        let store = Arc::new(MemoryPendingStore::new());
        let accounts = Arc::new(MemoryAccountDirectory::new());
        let processor = CallbackProcessor::from_settings(settings, store.clone(), accounts.clone())
            .expect("fixture settings are valid");
        (processor, store, accounts)
    }

    #[must_use]
    pub fn client() -> ClientContext {
        ClientContext::new(Some(TEST_CLIENT_IP), Some(TEST_USER_AGENT))
    }

    /// A POST callback carrying `encoded` in the `opauth` field
    #[must_use]
    pub fn post_callback(encoded: &str) -> RawCallbackRequest {
        let mut form = HashMap::new();
        form.insert("opauth".to_string(), encoded.to_string());
        RawCallbackRequest::new(Self::client()).with_form(Some(form))
    }
}

/// Builds callback payloads signed with [`TEST_SALT`]
#[derive(Debug, Clone)]
pub struct CallbackPayloadBuilder {
    auth: Map<String, Value>,
    timestamp: String,
    salt: String,
    iterations: u32,
    signature: Option<String>,
}

impl Default for CallbackPayloadBuilder {
    fn default() -> Self {
        Self::new("Google", "1234567890")
    }
}

impl CallbackPayloadBuilder {
    #[must_use]
    pub fn new(provider: &str, uid: &str) -> Self {
        let mut auth = Map::new();
        auth.insert("provider".to_string(), json!(provider));
        auth.insert("uid".to_string(), json!(uid));
        Self {
            auth,
            timestamp: Utc::now().to_rfc3339(),
            salt: TEST_SALT.to_string(),
            iterations: 300,
            signature: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        self.auth
            .insert("info".to_string(), json!({"email": email, "name": "Test User"}));
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.to_rfc3339();
        self
    }

    #[must_use]
    pub fn with_salt(mut self, salt: &str) -> Self {
        self.salt = salt.to_string();
        self
    }

    /// Override the computed signature
    #[must_use]
    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    #[must_use]
    pub fn payload(&self) -> Value {
        let signature = self.signature.clone().unwrap_or_else(|| {
            sign_auth(&self.auth, &self.timestamp, &self.salt, self.iterations)
        });
        json!({
            "auth": self.auth,
            "timestamp": self.timestamp,
            "signature": signature,
        })
    }

    /// Base64 text as it appears in the callback field
    #[must_use]
    pub fn encoded(&self) -> String {
        encode_payload(&self.payload())
    }

    /// A provider error payload, encoded
    #[must_use]
    pub fn provider_error() -> String {
        encode_payload(&json!({
            "error": {"code": "access_denied", "message": "User denied access"},
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}
