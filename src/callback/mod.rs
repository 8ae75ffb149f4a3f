//! Provider callback handling
//!
//! - [`config`] - Resolved authentication configuration
//! - [`decoder`] - Transport extraction and payload decoding
//! - [`signature`] - Printed form and iterated HMAC signature
//! - [`validator`] - Structural, expiry and signature checks
//! - [`processor`] - End-to-end callback and start-flow orchestration

pub mod config;
pub mod decoder;
pub mod processor;
pub mod signature;
pub mod validator;

pub use config::{AuthConfig, StrategyConfig};
pub use decoder::{
    decode_payload, encode_payload, AuthResponse, CallbackDecoder, CallbackResponse,
    CallbackTransport, RawCallbackRequest,
};
pub use processor::{AuthenticationStart, CallbackProcessor};
pub use signature::{printed_representation, sign_auth, verify_signature};
pub use validator::{parse_timestamp, ResponseValidator, ValidatedAuth, ValidationOutcome};
