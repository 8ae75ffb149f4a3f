// Request extraction and response building shared by the handlers
use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};

use crate::callback::AuthConfig;
use crate::pending::ClientContext;

/// Client address, user agent and state cookie of a request
#[must_use]
pub fn client_context(req: &HttpRequest, state_cookie_name: &str) -> ClientContext {
    let client_ip = req.connection_info().realip_remote_addr().map(ToString::to_string);
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    let state_token = req.cookie(state_cookie_name);

    ClientContext::new(client_ip.as_deref(), user_agent)
        .with_state_token(state_token.as_ref().map(Cookie::value))
}

/// State cookie carrying the signed token across the provider round trip
///
/// Secure cookies use `SameSite=None` so a cross-site POST callback still
/// carries them.
#[must_use]
pub fn state_cookie(config: &AuthConfig, token: &str) -> Cookie<'static> {
    let same_site = if config.cookie_secure {
        SameSite::None
    } else {
        SameSite::Lax
    };
    Cookie::build(config.state_cookie_name.clone(), token.to_string())
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(same_site)
        .max_age(Duration::seconds(config.pending_ttl.num_seconds()))
        .finish()
}

/// Expired state cookie, sent once the token has been used
#[must_use]
pub fn expired_state_cookie(config: &AuthConfig) -> Cookie<'static> {
    Cookie::build(config.state_cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .max_age(Duration::ZERO)
        .finish()
}

/// 302 Found to `location`, setting the given cookies
#[must_use]
pub fn found(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
    let mut builder = HttpResponse::Found();
    for cookie in cookies {
        builder.cookie(cookie);
    }
    builder
        .insert_header((header::LOCATION, location.to_string()))
        .finish()
}
