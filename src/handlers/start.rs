// Authentication start handler
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use log::warn;
use serde::Deserialize;

use super::helpers::{client_context, found, state_cookie};
use crate::callback::CallbackProcessor;

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub return_url: Option<String>,
}

/// Stores the return target and redirects to the strategy's entry URL
///
/// Without an explicit `return_url` the `Referer` header is used.
pub async fn auth_start(
    path: web::Path<String>,
    query: web::Query<StartQuery>,
    req: HttpRequest,
    processor: web::Data<CallbackProcessor>,
) -> Result<HttpResponse> {
    let strategy = path.into_inner();
    let config = processor.config();
    let client = client_context(&req, &config.state_cookie_name);

    let referer = req
        .headers()
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok());
    let return_url = query.return_url.as_deref().or(referer);

    match processor.begin_authentication(&strategy, return_url, &client) {
        Ok(start) => {
            let cookies = start
                .state_token
                .as_deref()
                .map(|token| state_cookie(config, token))
                .into_iter()
                .collect();
            Ok(found(&start.location, cookies))
        }
        Err(e) => {
            warn!("Rejected authentication start: {e}");
            Ok(HttpResponse::NotFound().json(serde_json::json!({
                "error": "unknown_strategy",
                "message": e.to_string()
            })))
        }
    }
}
