//! HTTP transport: the decorator pipeline mounted on an axum server.

use crate::db::ConnectionManager;
use crate::error::{TransportError, error_response};
use crate::handlers;
use crate::middleware::{
    ConnectionRouter, Decorator, HeaderSelector, ObserveDecorator, Pipeline, RequestIdDecorator,
    into_router, router_handler,
};
use crate::metrics::Metrics;
use axum::http::{HeaderName, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Build the application router.
///
/// Resource routes run behind request id, observability and connection
/// routing, in that order from the outside in. `GET /metrics` serves the
/// Prometheus registry and bypasses the pipeline, so it answers even when no
/// database is selected.
pub fn build_app(
    manager: Arc<ConnectionManager>,
    db_header: HeaderName,
) -> Result<axum::Router, TransportError> {
    let metrics = Arc::new(Metrics::new(manager.clone())?);
    let selector = Arc::new(HeaderSelector::new(db_header));
    let pipeline = Pipeline::new()
        .with(RequestIdDecorator)
        .with(ObserveDecorator::new(metrics.http()))
        .with(ConnectionRouter::new(manager, selector));

    let handler = pipeline.decorate(router_handler(handlers::routes()));

    Ok(into_router(handler).route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move {
                match metrics.render() {
                    Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body)
                        .into_response(),
                    Err(e) => {
                        error!(error = %e, "Failed to encode metrics");
                        error_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "internal",
                            "Failed to encode metrics",
                        )
                    }
                }
            }
        }),
    ))
}

/// Serves [`build_app`] until SIGINT or SIGTERM, then closes every pool.
pub struct HttpTransport {
    connection_manager: Arc<ConnectionManager>,
    host: String,
    port: u16,
    db_header: HeaderName,
}

impl HttpTransport {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        host: impl Into<String>,
        port: u16,
        db_header: HeaderName,
    ) -> Self {
        Self {
            connection_manager,
            host: host.into(),
            port,
            db_header,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn run(&self) -> Result<(), TransportError> {
        let bind_addr = self.bind_addr();
        let app = build_app(self.connection_manager.clone(), self.db_header.clone())?;

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        info!(
            addr = %bind_addr,
            db_header = %self.db_header,
            databases = ?self.connection_manager.names(),
            "Listening"
        );

        // In-flight requests get this long to finish after the first signal.
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal);

        let result = tokio::select! {
            result = server => {
                match &result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => error!(error = %e, "HTTP server error"),
                }
                result.map_err(TransportError::Serve)
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => Ok(())
        };

        // Pools close only once the server has stopped taking requests.
        info!("Closing database connections");
        self.connection_manager.close().await;

        result
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
