//! Request timing, metrics and access logging.

use crate::metrics::HttpMetrics;
use crate::middleware::{BoxedHandler, Decorator, RequestScope};
use axum::body::HttpBody;
use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Path label for requests that never reached a route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Logs and counts every request once the inner handler returns.
///
/// Metrics are labelled with the route pattern (`/dude/{id}`) rather than the
/// raw path. Routers mounted behind the pipeline expose the pattern with
/// [`expose_matched_path`]; anything else is labelled [`UNMATCHED_PATH`].
///
/// Needs the request id, so it must sit inside [`RequestIdDecorator`].
///
/// [`RequestIdDecorator`]: crate::middleware::RequestIdDecorator
#[derive(Debug, Clone)]
pub struct ObserveDecorator {
    metrics: HttpMetrics,
}

impl ObserveDecorator {
    pub fn new(metrics: HttpMetrics) -> Self {
        Self { metrics }
    }
}

impl Decorator for ObserveDecorator {
    fn decorate(&self, next: BoxedHandler) -> BoxedHandler {
        let metrics = self.metrics.clone();
        Arc::new(move |scope: RequestScope, req: Request| {
            let next = next.clone();
            let metrics = metrics.clone();
            async move {
                let request_id = match scope.request_id() {
                    Ok(id) => id.clone(),
                    Err(e) => return e.into_response(),
                };
                let start = Instant::now();
                let method = req.method().clone();
                let path = req.uri().path().to_string();
                let version = req.version();
                let remote = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string());
                let user_agent = header_str(&req, header::USER_AGENT);
                let referer = header_str(&req, header::REFERER);

                let response = next(scope, req).await;
                let elapsed = start.elapsed();
                let status = response.status();
                let pattern = response
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| UNMATCHED_PATH.to_string());

                info!(
                    request_id = %request_id,
                    remote = remote.as_deref().unwrap_or("-"),
                    method = %method,
                    path = %path,
                    version = ?version,
                    status = status.as_u16(),
                    bytes = response.body().size_hint().exact(),
                    referer = referer.as_deref(),
                    user_agent = user_agent.as_deref(),
                    elapsed = ?elapsed,
                    "Request completed"
                );
                metrics.observe(&pattern, &method, status, elapsed);
                response
            }
            .boxed()
        })
    }
}

fn header_str(req: &Request, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Route middleware copying the matched route pattern into the response,
/// where [`ObserveDecorator`] reads it for its metric labels.
pub async fn expose_matched_path(path: MatchedPath, req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response.extensions_mut().insert(path);
    response
}
