#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use socialgate::{
    configure_services, settings::SocialgateSettings, utils::logging::LoggingHelper,
    CallbackProcessor, MemoryAccountDirectory, MemoryPendingStore,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = SocialgateSettings::load()
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {e}"))?;

    let processor = CallbackProcessor::from_settings(
        &settings,
        Arc::new(MemoryPendingStore::new()),
        Arc::new(MemoryAccountDirectory::new()),
    )
    .context("Failed to initialize callback processor")?;

    LoggingHelper::log_strategies_summary(processor.config());
    start_server(processor, settings)
        .await
        .context("Server terminated with an error")
}

/// Start the server with in-memory pending targets and accounts
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(
    processor: CallbackProcessor,
    settings: SocialgateSettings,
) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    let processor = web::Data::new(processor);
    let routes = configure_services(&settings);

    HttpServer::new(move || {
        App::new()
            .app_data(processor.clone())
            .wrap(Logger::default())
            .configure(routes.clone())
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &SocialgateSettings) {
    let prefix = settings.application.path_prefix.trim_end_matches('/');
    println!("Starting Socialgate on http://{bind_address}");
    println!("Callback transport: {}", settings.callback.transport);
    println!("Return target fingerprint: {}", settings.pending.fingerprint);
    println!();
    println!("Authentication endpoints:");
    println!("  GET  {prefix}/{{strategy}}?return_url=  - Start authentication");
    println!("  GET|POST {prefix}/{{strategy}}/callback - Provider callback");
    println!("  GET  {prefix}/account/redirect?location= - Redirect after account update");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping            - Health check");
}
