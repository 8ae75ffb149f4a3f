//! Auth response signatures
//!
//! A signature binds the printed form of the `auth` object to the payload
//! timestamp under the shared security salt:
//!
//! ```text
//! d0 = SHA-256(printed(auth))
//! di = HMAC-SHA256(salt, d(i-1) || timestamp)    for i in 1..=iterations
//! signature = base64url(d_iterations)
//! ```
//!
//! The printed form is a nested key/value dump with keys in sorted order, so
//! the provider and this service derive identical bytes from the same map.

use base64::{engine::general_purpose, Engine as _};
use hmac::Mac;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::utils::crypto::keyed_mac;

const ENTRY_INDENT: usize = 4;
const NESTED_INDENT: usize = 8;

/// Render a map in the canonical printed layout
///
/// ```text
/// Array
/// (
///     [provider] => Google
///     [uid] => 42
/// )
/// ```
#[must_use]
pub fn printed_representation(auth: &Map<String, Value>) -> String {
    let mut out = String::new();
    print_map(auth, 0, &mut out);
    out
}

fn print_value(value: &Value, indent: usize, out: &mut String) {
    match value {
        Value::Object(map) => print_map(map, indent, out),
        Value::Array(items) => {
            let entries = items
                .iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item));
            print_entries(entries, indent, out);
        }
        Value::String(s) => out.push_str(s),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(true) => out.push('1'),
        Value::Bool(false) | Value::Null => {}
    }
}

fn print_map(map: &Map<String, Value>, indent: usize, out: &mut String) {
    let mut entries: Vec<(String, &Value)> = map.iter().map(|(k, v)| (k.clone(), v)).collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    print_entries(entries.into_iter(), indent, out);
}

fn print_entries<'a>(
    entries: impl Iterator<Item = (String, &'a Value)>,
    indent: usize,
    out: &mut String,
) {
    let pad = " ".repeat(indent);
    let entry_pad = " ".repeat(indent + ENTRY_INDENT);

    out.push_str("Array\n");
    out.push_str(&pad);
    out.push_str("(\n");
    for (key, value) in entries {
        out.push_str(&entry_pad);
        out.push('[');
        out.push_str(&key);
        out.push_str("] => ");
        print_value(value, indent + NESTED_INDENT, out);
        out.push('\n');
    }
    out.push_str(&pad);
    out.push_str(")\n");
}

/// Run the digest chain, returning `d_rounds`
fn digest_chain(printed: &str, timestamp: &str, salt: &str, rounds: u32) -> Vec<u8> {
    let mut digest = Sha256::digest(printed.as_bytes()).to_vec();
    for _ in 0..rounds {
        let mut mac = keyed_mac(salt.as_bytes());
        mac.update(&digest);
        mac.update(timestamp.as_bytes());
        digest = mac.finalize().into_bytes().to_vec();
    }
    digest
}

/// Compute the signature a provider must supply for `auth` at `timestamp`
///
/// An iteration count of zero is treated as one.
#[must_use]
pub fn sign_auth(
    auth: &Map<String, Value>,
    timestamp: &str,
    salt: &str,
    iterations: u32,
) -> String {
    let printed = printed_representation(auth);
    let digest = digest_chain(&printed, timestamp, salt, iterations.max(1));
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Check `signature` against `auth` and `timestamp`
///
/// The final round is compared in constant time.
#[must_use]
pub fn verify_signature(
    auth: &Map<String, Value>,
    timestamp: &str,
    signature: &str,
    salt: &str,
    iterations: u32,
) -> bool {
    let Ok(expected) =
        general_purpose::URL_SAFE_NO_PAD.decode(signature.trim().trim_end_matches('='))
    else {
        return false;
    };

    let printed = printed_representation(auth);
    let previous = digest_chain(&printed, timestamp, salt, iterations.max(1) - 1);

    let mut mac = keyed_mac(salt.as_bytes());
    mac.update(&previous);
    mac.update(timestamp.as_bytes());
    mac.verify_slice(&expected).is_ok()
}
