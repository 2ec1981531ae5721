use std::{error::Error, sync::Arc};

use clap::Parser;
use vudata::{
    api::{self, AppState},
    config::{CliArgs, Config},
    storage, telemetry, Primitives,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli)?;

    telemetry::init_logging(&config.logging);

    let metrics = match telemetry::install_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let store = storage::open(&config.storage)?;
    let state = AppState {
        primitives: Arc::new(Primitives::new(store)),
        metrics,
    };
    let app = api::router(state, Arc::new(config.auth.clone()));

    if config.auth.enabled {
        tracing::info!(keys = config.auth.api_keys.len(), "API key authentication enabled");
    }

    let addr = config.listen_addr()?;
    tracing::info!(%addr, backend = ?config.storage.backend, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
