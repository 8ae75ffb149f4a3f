//! Client fingerprints for pending return targets
//!
//! Two strategies are supported:
//!
//! - [`FingerprintStrategy::ClientContext`] hashes the client address and user
//!   agent. This identifies a client rather than a session, so two tabs (or two
//!   users behind one NAT with the same browser build) share a fingerprint.
//! - [`FingerprintStrategy::StateToken`] issues a signed single-use token at
//!   authentication start and reads it back on the callback.

use base64::{engine::general_purpose, Engine as _};
use hmac::Mac;
use std::fmt;
use std::str::FromStr;

use crate::utils::crypto::{generate_nonce, keyed_mac, sha256_hex};

const STATE_TOKEN_CONTEXT: &[u8] = b"socialgate-state-token|";

/// Request data a fingerprint is derived from, passed in explicitly
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    /// Value of the state cookie, if the client sent one
    pub state_token: Option<String>,
}

impl ClientContext {
    #[must_use]
    pub fn new(client_ip: Option<&str>, user_agent: Option<&str>) -> Self {
        Self {
            client_ip: client_ip.map(ToString::to_string),
            user_agent: user_agent.map(ToString::to_string),
            state_token: None,
        }
    }

    #[must_use]
    pub fn with_state_token(mut self, token: Option<&str>) -> Self {
        self.state_token = token.map(ToString::to_string);
        self
    }
}

/// Storage key identifying a client across the redirect-away/redirect-back cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Legacy fingerprint: SHA-256 over `address|user-agent`
    #[must_use]
    pub fn from_client(client_ip: Option<&str>, user_agent: Option<&str>) -> Self {
        let digest = sha256_hex(&[client_ip.unwrap_or(""), user_agent.unwrap_or("")]);
        Self(format!("client_{digest}"))
    }

    /// Fingerprint keyed by the nonce of a verified state token
    #[must_use]
    pub fn from_state_nonce(nonce: &str) -> Self {
        Self(format!("state_{nonce}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How fingerprints are derived, selected in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintStrategy {
    #[default]
    ClientContext,
    StateToken,
}

impl FromStr for FingerprintStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" | "client_context" => Ok(Self::ClientContext),
            "state_token" | "state" => Ok(Self::StateToken),
            other => Err(format!("unknown fingerprint strategy `{other}`")),
        }
    }
}

impl FingerprintStrategy {
    /// Derive the fingerprint for a request
    ///
    /// Returns `None` under the state-token strategy when the client sent no
    /// token or the token does not verify; the caller then falls back to the
    /// default destination.
    #[must_use]
    pub fn derive(
        &self,
        context: &ClientContext,
        signer: &StateTokenSigner,
    ) -> Option<Fingerprint> {
        match self {
            Self::ClientContext => Some(Fingerprint::from_client(
                context.client_ip.as_deref(),
                context.user_agent.as_deref(),
            )),
            Self::StateToken => context
                .state_token
                .as_deref()
                .and_then(|token| signer.verify(token))
                .map(|nonce| Fingerprint::from_state_nonce(&nonce)),
        }
    }
}

/// Issues and verifies `nonce.mac` state tokens under the security salt
#[derive(Clone)]
pub struct StateTokenSigner {
    key: Vec<u8>,
}

impl fmt::Debug for StateTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTokenSigner").finish_non_exhaustive()
    }
}

impl StateTokenSigner {
    #[must_use]
    pub fn new(salt: &str) -> Self {
        Self {
            key: salt.as_bytes().to_vec(),
        }
    }

    /// Issue a fresh token, returning `(token, nonce)`
    #[must_use]
    pub fn issue(&self) -> (String, String) {
        let nonce = generate_nonce(24);
        let mut mac = keyed_mac(&self.key);
        mac.update(STATE_TOKEN_CONTEXT);
        mac.update(nonce.as_bytes());
        let tag = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        (format!("{nonce}.{tag}"), nonce)
    }

    /// Verify a token and return its nonce
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<String> {
        let (nonce, tag) = token.split_once('.')?;
        if nonce.is_empty() {
            return None;
        }
        let tag_bytes = general_purpose::URL_SAFE_NO_PAD.decode(tag).ok()?;

        let mut mac = keyed_mac(&self.key);
        mac.update(STATE_TOKEN_CONTEXT);
        mac.update(nonce.as_bytes());
        mac.verify_slice(&tag_bytes).ok()?;

        Some(nonce.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_fingerprint_deterministic() {
        let a = Fingerprint::from_client(Some("203.0.113.7"), Some("Mozilla/5.0"));
        let b = Fingerprint::from_client(Some("203.0.113.7"), Some("Mozilla/5.0"));
        let other_agent = Fingerprint::from_client(Some("203.0.113.7"), Some("curl/8.0"));

        assert_eq!(a, b);
        assert_ne!(a, other_agent);
        assert!(a.as_str().starts_with("client_"));
    }

    #[test]
    fn test_client_fingerprint_tolerates_missing_headers() {
        let fp = Fingerprint::from_client(None, None);
        assert_eq!(fp, Fingerprint::from_client(Some(""), Some("")));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "client".parse::<FingerprintStrategy>(),
            Ok(FingerprintStrategy::ClientContext)
        );
        assert_eq!(
            "STATE_TOKEN".parse::<FingerprintStrategy>(),
            Ok(FingerprintStrategy::StateToken)
        );
        assert!("ip".parse::<FingerprintStrategy>().is_err());
    }

    #[test]
    fn test_state_token_round_trip() {
        let signer = StateTokenSigner::new("salt");
        let (token, nonce) = signer.issue();

        assert_eq!(signer.verify(&token), Some(nonce));
    }

    #[test]
    fn test_state_token_rejects_forgery() {
        let signer = StateTokenSigner::new("salt");
        let (token, _) = signer.issue();
        let (nonce, _) = token.split_once('.').unwrap();

        assert!(signer.verify(&format!("{nonce}.AAAA")).is_none());
        assert!(signer.verify("no-separator").is_none());
        assert!(StateTokenSigner::new("other-salt").verify(&token).is_none());
    }

    #[test]
    fn test_state_strategy_without_token_has_no_fingerprint() {
        let signer = StateTokenSigner::new("salt");
        let context = ClientContext::new(Some("203.0.113.7"), Some("Mozilla/5.0"));

        assert!(FingerprintStrategy::StateToken
            .derive(&context, &signer)
            .is_none());
        assert!(FingerprintStrategy::ClientContext
            .derive(&context, &signer)
            .is_some());
    }

    #[test]
    fn test_state_strategy_ignores_client_context() {
        let signer = StateTokenSigner::new("salt");
        let (token, nonce) = signer.issue();

        let first =
            ClientContext::new(Some("203.0.113.7"), Some("A")).with_state_token(Some(&token));
        let second =
            ClientContext::new(Some("198.51.100.2"), Some("B")).with_state_token(Some(&token));

        let expected = Some(Fingerprint::from_state_nonce(&nonce));
        assert_eq!(FingerprintStrategy::StateToken.derive(&first, &signer), expected);
        assert_eq!(FingerprintStrategy::StateToken.derive(&second, &signer), expected);
    }
}
