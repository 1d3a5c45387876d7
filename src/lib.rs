pub mod api;
pub mod config;
pub mod consent;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod identity;
pub mod mailer;
pub mod models;
pub mod records;
pub mod storage;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the service and block until Ctrl-C.
pub async fn run() -> Result<(), String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env().map_err(|e| e.to_string())?;
    let bind_addr = config.bind_addr;
    let core = Arc::new(core_state::CoreState::initialize(config).map_err(|e| e.to_string())?);

    let server = api::start_api_server_on(core, bind_addr).await?;
    tracing::info!(addr = %server.addr(), "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
    }

    server.stop().await;
    Ok(())
}
