//! Return target validation
//!
//! A return target is accepted only if it stays on the site: either a safe
//! relative path, resolved against the site base, or an absolute http(s) URL
//! on the same host and port as the site. Everything else is an open
//! redirect candidate and is dropped.

use log::{debug, warn};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

const MAX_TARGET_LEN: usize = 2048;

// High-confidence attack patterns that URL parsing won't catch
static PATH_TRAVERSAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.\.").unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

static PROTOCOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z][a-z0-9+.-]*:)|(?:/{2,})")
        .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

static SUSPICIOUS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\x00-\x1F\x7F-\x9F]|%(?:00|0[aAdD]|09|5c|26%23)|^[.@〱〵ゝーｰ]|\\|[\u{200E}\u{200F}\u{2060}-\u{2064}\u{2000}-\u{200A}]")
        .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected return target `{target}`: {reason}")]
pub struct InvalidReturnTarget {
    pub target: String,
    pub reason: &'static str,
}

fn reject(target: &str, reason: &'static str) -> InvalidReturnTarget {
    warn!("Rejected return target ({reason}): {target}");
    InvalidReturnTarget {
        target: target.to_string(),
        reason,
    }
}

/// Same-site policy for return targets
#[derive(Debug, Clone)]
pub struct ReturnTargetPolicy {
    site: Url,
}

impl ReturnTargetPolicy {
    #[must_use]
    pub fn new(site: Url) -> Self {
        Self { site }
    }

    /// Validate a candidate and return it as an absolute URL
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate is malformed, suspicious or leaves
    /// the site
    pub fn validate(&self, candidate: &str) -> Result<String, InvalidReturnTarget> {
        debug!("Validating return target: {candidate}");
        let candidate = candidate.trim();

        if candidate.is_empty() {
            return Err(reject(candidate, "empty"));
        }
        if candidate.len() > MAX_TARGET_LEN {
            return Err(reject(candidate, "too long"));
        }

        if is_relative_url(candidate) {
            validate_relative_path(candidate)?;
            return self
                .site
                .join(candidate)
                .map(String::from)
                .map_err(|_| reject(candidate, "cannot be resolved against the site"));
        }

        self.validate_absolute(candidate)
    }

    fn validate_absolute(&self, candidate: &str) -> Result<String, InvalidReturnTarget> {
        let parsed = Url::parse(candidate).map_err(|_| reject(candidate, "not a URL"))?;

        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(reject(candidate, "scheme not allowed"));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(reject(candidate, "credentials in URL"));
        }
        if parsed.host_str() != self.site.host_str()
            || parsed.port_or_known_default() != self.site.port_or_known_default()
        {
            return Err(reject(candidate, "different host"));
        }

        let path_and_query = match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        };
        validate_encoded_patterns(candidate, &path_and_query)?;

        Ok(parsed.into())
    }
}

/// Starts with `/`, not `//`, and has no scheme
fn is_relative_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains(':')
}

fn validate_relative_path(path: &str) -> Result<(), InvalidReturnTarget> {
    if PATH_TRAVERSAL_PATTERN.is_match(path) {
        return Err(reject(path, "path traversal"));
    }
    if SUSPICIOUS_PATTERN.is_match(path) {
        return Err(reject(path, "suspicious characters"));
    }
    validate_encoded_patterns(path, path)
}

fn validate_encoded_patterns(original: &str, path: &str) -> Result<(), InvalidReturnTarget> {
    for decoded in decoded_variants(path) {
        if PATH_TRAVERSAL_PATTERN.is_match(&decoded) {
            return Err(reject(original, "encoded path traversal"));
        }
        if PROTOCOL_PATTERN.is_match(&decoded) {
            return Err(reject(original, "encoded protocol"));
        }
        if SUSPICIOUS_PATTERN.is_match(&decoded) {
            return Err(reject(original, "encoded suspicious characters"));
        }
        if contains_dangerous_protocol(&decoded.to_lowercase()) {
            return Err(reject(original, "dangerous protocol"));
        }
        if decoded.matches('@').count() > 1 {
            return Err(reject(original, "domain confusion"));
        }
    }
    Ok(())
}

/// The input plus up to two rounds of percent-decoding
fn decoded_variants(path: &str) -> Vec<String> {
    let mut variants = Vec::with_capacity(3);
    variants.push(path.to_string());

    if let Ok(decoded) = urlencoding::decode(path) {
        let decoded = decoded.into_owned();
        if decoded != path {
            if let Ok(double_decoded) = urlencoding::decode(&decoded) {
                let double_decoded = double_decoded.into_owned();
                if double_decoded != decoded {
                    variants.push(double_decoded);
                }
            }
            variants.push(decoded);
        }
    }

    variants
}

fn contains_dangerous_protocol(text: &str) -> bool {
    const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "ftp:"];
    DANGEROUS_PROTOCOLS.iter().any(|protocol| text.contains(protocol))
}
