//! Error types for callback processing and configuration
//!
//! Every [`CallbackError`] is caught at the callback boundary and turned into an
//! error-marked redirect. The `Display` output is meant for operators (logs),
//! never for the end user.

use thiserror::Error;

/// Specific reason a decoded callback response failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The upstream provider put an explicit error indicator in the payload
    ProviderError,
    /// `auth`, `auth.provider`, `auth.uid`, `timestamp` or `signature` missing
    MissingComponents,
    /// The payload timestamp is older than the configured security timeout
    Expired,
    /// The recomputed signature does not match the supplied one
    SignatureMismatch,
    /// `auth.provider` is not an enabled strategy, or not the one the
    /// callback route was addressed to
    UnknownProvider,
}

/// Failures that can occur while handling an authentication callback
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Missing payload on the configured transport, or unsupported transport
    #[error("Opauth transport error: {0}")]
    Transport(String),

    /// Payload is not valid base64 or not a valid serialized structure
    #[error("Unable to decode auth response: {reason}")]
    Decode { reason: String, raw: String },

    /// The upstream provider explicitly reported an error
    #[error("Response error: provider reported an error")]
    Provider,

    /// Missing fields, expired timestamp, signature mismatch or unknown provider
    #[error("{1}")]
    Validation(ValidationFailure, String),

    /// The account bridge could not resolve or create a local identity
    #[error("Account resolution failed: {0}")]
    AccountResolution(String),
}

impl CallbackError {
    /// Raw payload text to include in forensic logs, when known
    #[must_use]
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            Self::Decode { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Failures when starting authentication with a strategy
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Unknown or disabled strategy `{0}`")]
    UnknownStrategy(String),
}

/// Configuration problems detected while loading settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] basic_toml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_is_reason() {
        let err = CallbackError::Validation(
            ValidationFailure::SignatureMismatch,
            "Invalid auth response - Signature does not validate".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "Invalid auth response - Signature does not validate"
        );
    }

    #[test]
    fn test_raw_payload_only_for_decode_errors() {
        let decode = CallbackError::Decode {
            reason: "bad base64".to_string(),
            raw: "%%%".to_string(),
        };
        assert_eq!(decode.raw_payload(), Some("%%%"));
        assert_eq!(CallbackError::Provider.raw_payload(), None);
    }
}
