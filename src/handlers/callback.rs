// Provider callback handler
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::{debug, warn};
use std::collections::HashMap;

use super::helpers::{client_context, expired_state_cookie, found};
use crate::callback::{CallbackProcessor, RawCallbackRequest};
use crate::pending::FingerprintStrategy;

/// Accepts the provider's POST or GET callback and redirects the browser
///
/// Always answers with a redirect; failures are expressed through the
/// error marker on the destination.
pub async fn auth_callback(
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
    form: Result<web::Form<HashMap<String, String>>, actix_web::Error>,
    req: HttpRequest,
    processor: web::Data<CallbackProcessor>,
) -> Result<HttpResponse> {
    let strategy = path.into_inner();
    let config = processor.config();

    let form = match form {
        Ok(form) => Some(form.into_inner()),
        Err(e) if *req.method() == Method::POST => {
            warn!("Unreadable form body on {strategy} callback: {e}");
            None
        }
        Err(_) => None,
    };
    debug!(
        "Callback for strategy {strategy} via {} (form present: {})",
        config.callback_transport,
        form.is_some()
    );

    let raw = RawCallbackRequest::new(client_context(&req, &config.state_cookie_name))
        .with_query(query.into_inner())
        .with_form(form)
        .with_strategy(&strategy);

    let target = processor.handle_callback(&raw).await;

    let cookies = if config.fingerprint == FingerprintStrategy::StateToken {
        vec![expired_state_cookie(config)]
    } else {
        Vec::new()
    };
    Ok(found(&target.location, cookies))
}
