//! Dude service - main entry point.

use axum::http::HeaderName;
use clap::Parser;
use dude::config::Config;
use dude::db::{ConnectionManager, EmbeddedMigrations};
use dude::transport::HttpTransport;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    let config = Config::parse();
    init_tracing(&config);

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }
    info!("Starting dude v{}", env!("CARGO_PKG_VERSION"));

    let db_header = HeaderName::try_from(config.db_header.as_str()).map_err(|e| {
        error!(header = %config.db_header, error = %e, "Invalid database header name");
        e
    })?;

    let endpoints = config.endpoints(std::env::vars()).map_err(|e| {
        error!(error = %e, "Invalid database configuration");
        e
    })?;

    let mut manager = ConnectionManager::new();
    if config.migrate {
        manager = manager.with_migrations(Arc::new(EmbeddedMigrations));
    }

    if let Err(e) = manager.setup(endpoints).await {
        match e.suggestion() {
            Some(suggestion) => error!(error = %e, suggestion, "Database setup failed"),
            None => error!(error = %e, "Database setup failed"),
        }
        return Err(e.into());
    }

    let transport = HttpTransport::new(
        Arc::new(manager),
        &config.http_host,
        config.http_port,
        db_header,
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
