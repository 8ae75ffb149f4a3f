//! Structural, freshness and signature checks on decoded callbacks
//!
//! Checks run in a fixed order and stop at the first failure: provider error,
//! required components, expiry, signature. The provider and uid casing are
//! left untouched here; normalization happens when the profile is built.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde_json::{Map, Value};

use super::decoder::{scalar_text, CallbackResponse};
use super::signature::verify_signature;
use crate::error::{CallbackError, ValidationFailure};

pub const PROVIDER_ERROR_REASON: &str = "provider reported an error";
pub const MISSING_COMPONENTS_REASON: &str = "Invalid auth response - missing required components";
pub const EXPIRED_REASON: &str = "Invalid auth response - Auth response expired";
pub const SIGNATURE_MISMATCH_REASON: &str = "Invalid auth response - Signature does not validate";
pub const UNKNOWN_PROVIDER_REASON: &str = "Invalid auth response - Provider is not available";

/// Result of validating a callback response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    /// Operator-facing reason, present iff `valid` is false
    pub reason: Option<String>,
    pub failure: Option<ValidationFailure>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            valid: true,
            reason: None,
            failure: None,
        }
    }

    /// Map any callback error to an invalid outcome
    #[must_use]
    pub fn from_error(error: &CallbackError) -> Self {
        let (reason, failure) = match error {
            CallbackError::Provider => (
                PROVIDER_ERROR_REASON.to_string(),
                Some(ValidationFailure::ProviderError),
            ),
            CallbackError::Validation(failure, reason) => (reason.clone(), Some(*failure)),
            other => (other.to_string(), None),
        };
        Self {
            valid: false,
            reason: Some(reason),
            failure,
        }
    }
}

/// The parts of a response that passed validation
#[derive(Debug, Clone, Copy)]
pub struct ValidatedAuth<'a> {
    pub auth: &'a Map<String, Value>,
    pub provider: &'a str,
    pub uid: &'a Value,
    pub timestamp: &'a str,
}

impl ValidatedAuth<'_> {
    /// The uid as text; numeric uids are rendered in decimal
    #[must_use]
    pub fn uid_text(&self) -> String {
        scalar_text(self.uid)
            .map(|uid| uid.trim().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ResponseValidator {
    salt: String,
    iterations: u32,
    timeout: Duration,
}

impl ResponseValidator {
    #[must_use]
    pub fn new(salt: &str, iterations: u32, timeout: Duration) -> Self {
        Self {
            salt: salt.to_string(),
            iterations,
            timeout,
        }
    }

    #[must_use]
    pub fn validate(&self, response: &CallbackResponse) -> ValidationOutcome {
        self.validate_at(response, Utc::now())
    }

    #[must_use]
    pub fn validate_at(
        &self,
        response: &CallbackResponse,
        now: DateTime<Utc>,
    ) -> ValidationOutcome {
        match self.check_at(response, now) {
            Ok(_) => ValidationOutcome::success(),
            Err(err) => ValidationOutcome::from_error(&err),
        }
    }

    /// Validate and borrow the verified parts of the response
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError::Provider`] or a [`CallbackError::Validation`]
    /// describing the first failed check
    pub fn check_at<'a>(
        &self,
        response: &'a CallbackResponse,
        now: DateTime<Utc>,
    ) -> Result<ValidatedAuth<'a>, CallbackError> {
        let auth_response = match response {
            CallbackResponse::Error { error } => {
                debug!("Provider error payload: {error}");
                return Err(CallbackError::Provider);
            }
            CallbackResponse::Auth(auth_response) => auth_response,
        };

        let missing = || {
            CallbackError::Validation(
                ValidationFailure::MissingComponents,
                MISSING_COMPONENTS_REASON.to_string(),
            )
        };

        let auth = auth_response.auth.as_ref().ok_or_else(missing)?;
        let timestamp = auth_response.timestamp.as_deref().ok_or_else(missing)?;
        let signature = auth_response.signature.as_deref().ok_or_else(missing)?;
        let provider = auth
            .get("provider")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(missing)?;
        let uid = auth
            .get("uid")
            .filter(|uid| scalar_text(uid).is_some())
            .ok_or_else(missing)?;

        if self.is_expired(timestamp, now) {
            return Err(CallbackError::Validation(
                ValidationFailure::Expired,
                EXPIRED_REASON.to_string(),
            ));
        }

        if !verify_signature(auth, timestamp, signature, &self.salt, self.iterations) {
            return Err(CallbackError::Validation(
                ValidationFailure::SignatureMismatch,
                SIGNATURE_MISMATCH_REASON.to_string(),
            ));
        }

        Ok(ValidatedAuth {
            auth,
            provider,
            uid,
            timestamp,
        })
    }

    /// An unparseable timestamp counts as expired; a deadline past the end of
    /// the calendar never does
    fn is_expired(&self, timestamp: &str, now: DateTime<Utc>) -> bool {
        parse_timestamp(timestamp).is_none_or(|issued| {
            issued
                .checked_add_signed(self.timeout)
                .is_some_and(|deadline| deadline < now)
        })
    }
}

/// Parse an RFC 3339 timestamp or whole unix seconds
#[must_use]
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let trimmed = timestamp.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    trimmed
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::decoder::AuthResponse;
    use crate::callback::signature::sign_auth;
    use serde_json::json;

    const SALT: &str = "test-salt";

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn validator() -> ResponseValidator {
        ResponseValidator::new(SALT, 300, Duration::seconds(120))
    }

    fn signed(auth: &Value, timestamp: &str) -> CallbackResponse {
        let map = auth.as_object().cloned().unwrap();
        let signature = sign_auth(&map, timestamp, SALT, 300);
        CallbackResponse::Auth(AuthResponse {
            auth: Some(map),
            timestamp: Some(timestamp.to_string()),
            signature: Some(signature),
        })
    }

    #[test]
    fn test_valid_response() {
        let response = signed(&json!({"provider": "Google", "uid": "42"}), "2024-05-01T11:59:30Z");
        let outcome = validator().validate_at(&response, now());

        assert_eq!(outcome, ValidationOutcome::success());
    }

    #[test]
    fn test_numeric_uid_and_unix_timestamp() {
        let timestamp = now().timestamp().to_string();
        let response = signed(&json!({"provider": "Facebook", "uid": 1001}), &timestamp);

        let checked = validator().check_at(&response, now()).unwrap();
        assert_eq!(checked.provider, "Facebook");
        assert_eq!(checked.uid_text(), "1001");
    }

    #[test]
    fn test_provider_error_short_circuits() {
        let response = CallbackResponse::Error {
            error: json!({"code": "access_denied"}),
        };
        let outcome = validator().validate_at(&response, now());

        assert!(!outcome.valid);
        assert_eq!(outcome.failure, Some(ValidationFailure::ProviderError));
        assert_eq!(outcome.reason.as_deref(), Some(PROVIDER_ERROR_REASON));
    }

    #[test]
    fn test_missing_components() {
        let cases = [
            CallbackResponse::Auth(AuthResponse::default()),
            {
                let CallbackResponse::Auth(mut r) =
                    signed(&json!({"provider": "Google", "uid": "42"}), "2024-05-01T12:00:00Z")
                else {
                    unreachable!()
                };
                r.signature = None;
                CallbackResponse::Auth(r)
            },
            signed(&json!({"provider": "", "uid": "42"}), "2024-05-01T12:00:00Z"),
            signed(&json!({"provider": "Google"}), "2024-05-01T12:00:00Z"),
            signed(&json!({"provider": "Google", "uid": null}), "2024-05-01T12:00:00Z"),
        ];

        for response in &cases {
            let outcome = validator().validate_at(response, now());
            assert_eq!(outcome.failure, Some(ValidationFailure::MissingComponents));
            assert_eq!(outcome.reason.as_deref(), Some(MISSING_COMPONENTS_REASON));
        }
    }

    #[test]
    fn test_expired_response() {
        let response = signed(&json!({"provider": "Google", "uid": "42"}), "2024-05-01T11:57:59Z");
        let outcome = validator().validate_at(&response, now());

        assert_eq!(outcome.failure, Some(ValidationFailure::Expired));
        assert_eq!(outcome.reason.as_deref(), Some(EXPIRED_REASON));
    }

    #[test]
    fn test_unparseable_timestamp_is_expired() {
        let response = signed(&json!({"provider": "Google", "uid": "42"}), "yesterday");
        let outcome = validator().validate_at(&response, now());

        assert_eq!(outcome.failure, Some(ValidationFailure::Expired));
    }

    #[test]
    fn test_padded_timestamp_signed_verbatim() {
        let auth = json!({"provider": "Google", "uid": " 42 "});
        let response = signed(&auth, " 2024-05-01T11:59:30Z ");
        let checked = validator().check_at(&response, now()).unwrap();

        assert_eq!(checked.timestamp, " 2024-05-01T11:59:30Z ");
        assert_eq!(checked.uid_text(), "42");
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let response = signed(&json!({"provider": "Google", "uid": "42"}), "2024-05-01T11:00:00Z");
        let lenient = ResponseValidator::new(SALT, 300, Duration::MAX);

        assert_eq!(lenient.validate_at(&response, now()), ValidationOutcome::success());
    }

    #[test]
    fn test_tampered_auth_fails_signature() {
        let CallbackResponse::Auth(mut response) =
            signed(&json!({"provider": "Google", "uid": "42"}), "2024-05-01T11:59:30Z")
        else {
            unreachable!()
        };
        if let Some(auth) = response.auth.as_mut() {
            auth.insert("uid".to_string(), json!("1"));
        }

        let outcome = validator().validate_at(&CallbackResponse::Auth(response), now());
        assert_eq!(outcome.failure, Some(ValidationFailure::SignatureMismatch));
        assert_eq!(outcome.reason.as_deref(), Some(SIGNATURE_MISMATCH_REASON));
    }

    #[test]
    fn test_different_salt_fails_signature() {
        let response = signed(&json!({"provider": "Google", "uid": "42"}), "2024-05-01T11:59:30Z");
        let other = ResponseValidator::new("other-salt", 300, Duration::seconds(120));

        assert_eq!(
            other.validate_at(&response, now()).failure,
            Some(ValidationFailure::SignatureMismatch)
        );
    }

    #[test]
    fn test_from_error_keeps_other_errors_unclassified() {
        let outcome = ValidationOutcome::from_error(&CallbackError::AccountResolution(
            "directory offline".to_string(),
        ));
        assert!(!outcome.valid);
        assert_eq!(outcome.failure, None);
        assert!(outcome.reason.unwrap().contains("directory offline"));
    }
}
