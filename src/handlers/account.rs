// Redirect after the account details form has been saved
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;

use super::helpers::{client_context, found};
use crate::callback::CallbackProcessor;

#[derive(Debug, Deserialize)]
pub struct PostUpdateQuery {
    pub location: String,
}

pub async fn post_update_redirect(
    query: web::Query<PostUpdateQuery>,
    req: HttpRequest,
    processor: web::Data<CallbackProcessor>,
) -> Result<HttpResponse> {
    let client = client_context(&req, &processor.config().state_cookie_name);
    let location = processor.resolve_post_update_redirect(&query.location, &client);
    Ok(found(&location, Vec::new()))
}
