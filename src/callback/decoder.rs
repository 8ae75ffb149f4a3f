//! Callback payload extraction and decoding
//!
//! The provider posts back a single field (default `opauth`) holding a base64
//! encoded JSON document. The decoder pulls that field from the configured
//! transport, decodes it and classifies the result as an error report or an
//! auth response. Nothing here checks signatures.

use base64::{engine::general_purpose, Engine as _};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CallbackError;
use crate::pending::ClientContext;

/// Where the callback payload is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackTransport {
    /// Form-encoded request body
    #[default]
    Post,
    /// URL query string
    Get,
}

impl FromStr for CallbackTransport {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "get" => Ok(Self::Get),
            other => Err(CallbackError::Transport(format!(
                "unsupported transport callback `{other}`"
            ))),
        }
    }
}

impl fmt::Display for CallbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => f.write_str("post"),
            Self::Get => f.write_str("get"),
        }
    }
}

/// Everything the core needs from an incoming callback request
#[derive(Debug, Clone, Default)]
pub struct RawCallbackRequest {
    pub query: HashMap<String, String>,
    /// Parsed form body, `None` when the request carried no form
    pub form: Option<HashMap<String, String>>,
    pub client: ClientContext,
    /// Strategy segment of the callback route, when routed by strategy
    pub strategy: Option<String>,
}

impl RawCallbackRequest {
    #[must_use]
    pub fn new(client: ClientContext) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_form(mut self, form: Option<HashMap<String, String>>) -> Self {
        self.form = form;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = Some(strategy.to_string());
        self
    }
}

/// Fields of a non-error callback, each possibly absent
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthResponse {
    pub auth: Option<Map<String, Value>>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

/// A decoded callback payload
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackResponse {
    /// The payload carried an `error` key; its content is opaque
    Error { error: Value },
    Auth(AuthResponse),
}

impl CallbackResponse {
    /// Classify a decoded payload
    ///
    /// # Errors
    ///
    /// Returns a decode error if the payload is not a JSON object
    pub fn from_payload(payload: &Value) -> Result<Self, CallbackError> {
        let Some(object) = payload.as_object() else {
            return Err(CallbackError::Decode {
                reason: "payload is not a structured object".to_string(),
                raw: payload.to_string(),
            });
        };

        if let Some(error) = object.get("error") {
            return Ok(Self::Error {
                error: error.clone(),
            });
        }

        let auth = object
            .get("auth")
            .and_then(Value::as_object)
            .filter(|map| !map.is_empty())
            .cloned();

        Ok(Self::Auth(AuthResponse {
            auth,
            timestamp: object.get("timestamp").and_then(scalar_text),
            signature: object
                .get("signature")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
        }))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Non-blank string, kept verbatim, or number rendered as text
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads and decodes the payload field from the configured transport
#[derive(Debug, Clone)]
pub struct CallbackDecoder {
    transport: CallbackTransport,
    field: String,
}

impl CallbackDecoder {
    #[must_use]
    pub fn new(transport: CallbackTransport, field: &str) -> Self {
        Self {
            transport,
            field: field.to_string(),
        }
    }

    /// Extract the raw payload string from the request
    ///
    /// # Errors
    ///
    /// Returns a transport error when the field is absent on the configured
    /// transport
    pub fn extract<'a>(&self, raw: &'a RawCallbackRequest) -> Result<&'a str, CallbackError> {
        let source = match self.transport {
            CallbackTransport::Post => raw.form.as_ref(),
            CallbackTransport::Get => Some(&raw.query),
        };

        source
            .and_then(|fields| fields.get(&self.field))
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                CallbackError::Transport(format!(
                    "missing `{}` field on {} callback",
                    self.field, self.transport
                ))
            })
    }

    /// Decode the payload into a JSON value
    ///
    /// # Errors
    ///
    /// Returns a transport error if the field is missing, or a decode error if
    /// it is not valid base64 or JSON
    pub fn decode(&self, raw: &RawCallbackRequest) -> Result<Value, CallbackError> {
        let encoded = self.extract(raw)?;
        decode_payload(encoded)
    }

    /// Decode and classify in one step
    ///
    /// # Errors
    ///
    /// Returns any error from [`Self::decode`] or [`CallbackResponse::from_payload`]
    pub fn decode_response(
        &self,
        raw: &RawCallbackRequest,
    ) -> Result<CallbackResponse, CallbackError> {
        CallbackResponse::from_payload(&self.decode(raw)?)
    }
}

/// Decode a base64 (standard or URL-safe alphabet) JSON payload
///
/// # Errors
///
/// Returns a decode error carrying the raw text
pub fn decode_payload(encoded: &str) -> Result<Value, CallbackError> {
    let trimmed = encoded.trim();
    let bytes = general_purpose::STANDARD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .map_err(|e| CallbackError::Decode {
            reason: format!("invalid base64: {e}"),
            raw: encoded.to_string(),
        })?;

    serde_json::from_slice(&bytes).map_err(|e| CallbackError::Decode {
        reason: format!("invalid payload structure: {e}"),
        raw: encoded.to_string(),
    })
}

/// Encode a payload the way providers are expected to send it
#[must_use]
pub fn encode_payload(payload: &Value) -> String {
    general_purpose::STANDARD.encode(payload.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_request(field: &str, value: &str) -> RawCallbackRequest {
        let mut form = HashMap::new();
        form.insert(field.to_string(), value.to_string());
        RawCallbackRequest::new(ClientContext::default()).with_form(Some(form))
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("POST".parse::<CallbackTransport>().unwrap(), CallbackTransport::Post);
        assert_eq!(" get ".parse::<CallbackTransport>().unwrap(), CallbackTransport::Get);

        let err = "session".parse::<CallbackTransport>().unwrap_err();
        assert!(matches!(err, CallbackError::Transport(_)));
        assert!(err.to_string().contains("unsupported transport callback"));
    }

    #[test]
    fn test_decode_post_payload() {
        let payload = json!({
            "auth": {"provider": "Google", "uid": "42"},
            "timestamp": "2024-01-01T00:00:00Z",
            "signature": "abc",
        });
        let raw = post_request("opauth", &encode_payload(&payload));
        let decoder = CallbackDecoder::new(CallbackTransport::Post, "opauth");

        assert_eq!(decoder.decode(&raw).unwrap(), payload);
    }

    #[test]
    fn test_decode_get_ignores_form() {
        let payload = json!({"error": {"code": "denied"}});
        let raw = post_request("opauth", &encode_payload(&payload));
        let decoder = CallbackDecoder::new(CallbackTransport::Get, "opauth");

        assert!(matches!(decoder.decode(&raw), Err(CallbackError::Transport(_))));

        let mut query = HashMap::new();
        query.insert("opauth".to_string(), encode_payload(&payload));
        let raw = raw.with_query(query);
        assert!(decoder.decode_response(&raw).unwrap().is_error());
    }

    #[test]
    fn test_missing_form_is_transport_error() {
        let raw = RawCallbackRequest::new(ClientContext::default());
        let decoder = CallbackDecoder::new(CallbackTransport::Post, "opauth");

        let err = decoder.decode(&raw).unwrap_err();
        assert!(err.to_string().contains("missing `opauth` field"));
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let raw = post_request("opauth", "%%% not base64 %%%");
        let decoder = CallbackDecoder::new(CallbackTransport::Post, "opauth");

        let err = decoder.decode(&raw).unwrap_err();
        assert!(matches!(err, CallbackError::Decode { .. }));
        assert_eq!(err.raw_payload(), Some("%%% not base64 %%%"));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let encoded = general_purpose::STANDARD.encode("a:1:{s:4:\"auth\";}");
        let err = decode_payload(&encoded).unwrap_err();
        assert!(err.to_string().contains("invalid payload structure"));
    }

    #[test]
    fn test_url_safe_alphabet_accepted() {
        let payload = json!({"auth": {"provider": "x", "uid": "??>>"}});
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        assert_eq!(decode_payload(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let err = CallbackResponse::from_payload(&json!(["auth"])).unwrap_err();
        assert!(matches!(err, CallbackError::Decode { .. }));
    }

    #[test]
    fn test_error_key_wins() {
        let payload = json!({"error": "denied", "auth": {"provider": "x", "uid": "1"}});
        assert_eq!(
            CallbackResponse::from_payload(&payload).unwrap(),
            CallbackResponse::Error { error: json!("denied") }
        );
    }

    #[test]
    fn test_auth_fields_normalized() {
        let payload = json!({"auth": {}, "timestamp": 1_700_000_000, "signature": ""});
        let CallbackResponse::Auth(auth) = CallbackResponse::from_payload(&payload).unwrap() else {
            panic!("expected auth response");
        };

        assert_eq!(auth.auth, None);
        assert_eq!(auth.timestamp.as_deref(), Some("1700000000"));
        assert_eq!(auth.signature, None);
    }

    #[test]
    fn test_timestamp_kept_verbatim() {
        let payload = json!({"auth": {"provider": "x", "uid": "1"}, "timestamp": " 1700000000\n"});
        let CallbackResponse::Auth(auth) = CallbackResponse::from_payload(&payload).unwrap() else {
            panic!("expected auth response");
        };

        assert_eq!(auth.timestamp.as_deref(), Some(" 1700000000\n"));
    }
}
