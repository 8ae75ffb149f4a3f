//! Redirect selection after authentication
//!
//! - [`resolver`] - Destination table and post-update substitution
//! - [`validator`] - Same-site policy for return targets

pub mod resolver;
pub mod validator;

pub use resolver::{add_query_flag, RedirectResolver, RedirectTarget};
pub use validator::{InvalidReturnTarget, ReturnTargetPolicy};
