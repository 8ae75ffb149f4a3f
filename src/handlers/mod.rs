// HTTP request handlers for the authentication endpoints
pub mod account;
pub mod callback;
pub mod health;
pub mod helpers;
pub mod start;


// Re-export the main handler functions
pub use account::post_update_redirect;
pub use callback::auth_callback;
pub use health::health;
pub use start::auth_start;

use actix_web::web;

use crate::settings::SocialgateSettings;

/// Route table for the authentication endpoints under
/// `application.path_prefix`
///
/// The account redirect is registered before the `{strategy}` routes so it
/// is never taken for a strategy name. Form bodies up to
/// `callback.max_payload_bytes` are accepted.
#[must_use]
pub fn configure_services(
    settings: &SocialgateSettings,
) -> impl Fn(&mut web::ServiceConfig) + Clone {
    let prefix = format!("/{}", settings.application.path_prefix.trim_matches('/'));
    let form_limit = settings.callback.max_payload_bytes;
    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/ping", web::get().to(health)).service(
            web::scope(prefix.trim_end_matches('/'))
                .app_data(web::FormConfig::default().limit(form_limit))
                .route("/account/redirect", web::get().to(post_update_redirect))
                .route("/{strategy}/callback", web::get().to(auth_callback))
                .route("/{strategy}/callback", web::post().to(auth_callback))
                .route("/{strategy}", web::get().to(auth_start)),
        );
    }
}
