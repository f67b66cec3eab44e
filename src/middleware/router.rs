//! Per-request selection of the database that serves a request.

use crate::db::{ConnectionManager, DbPool};
use crate::error::RouteError;
use crate::middleware::{BoxedHandler, Decorator, RequestScope};
use crate::models::connection::normalize_name;
use axum::extract::Request;
use axum::http::HeaderName;
use axum::response::IntoResponse;
use futures_util::FutureExt;
use std::sync::Arc;
use tracing::debug;

/// Picks the logical database name for a request. An empty name means the
/// request did not choose one.
pub trait Selector: Send + Sync {
    fn select(&self, req: &Request) -> String;
}

impl<F> Selector for F
where
    F: Fn(&Request) -> String + Send + Sync,
{
    fn select(&self, req: &Request) -> String {
        self(req)
    }
}

/// Reads the database name from a request header, uppercased.
#[derive(Debug, Clone)]
pub struct HeaderSelector {
    header: HeaderName,
}

impl HeaderSelector {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl Selector for HeaderSelector {
    fn select(&self, req: &Request) -> String {
        req.headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(normalize_name)
            .unwrap_or_default()
    }
}

/// Decorator that binds the selected database's pool into the request scope.
#[derive(Clone)]
pub struct ConnectionRouter {
    manager: Arc<ConnectionManager>,
    selector: Arc<dyn Selector>,
}

impl ConnectionRouter {
    pub fn new(manager: Arc<ConnectionManager>, selector: Arc<dyn Selector>) -> Self {
        Self { manager, selector }
    }

    /// Resolve the pool for `req` without running anything downstream.
    pub fn resolve(&self, req: &Request) -> Result<DbPool, RouteError> {
        let name = self.selector.select(req);
        if name.is_empty() && self.manager.default_name().is_none() {
            return Err(RouteError::NoDatabaseSelected);
        }
        let pool = self.manager.lookup(&name)?;
        debug!(database = %name, db_type = %pool.db_type(), "Routed request");
        Ok(pool)
    }
}

impl std::fmt::Debug for ConnectionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRouter")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl Decorator for ConnectionRouter {
    fn decorate(&self, next: BoxedHandler) -> BoxedHandler {
        let router = self.clone();
        Arc::new(move |scope: RequestScope, req: Request| {
            let resolved = router.resolve(&req);
            let next = next.clone();
            async move {
                match resolved {
                    Ok(pool) => next(scope.with_connection(pool), req).await,
                    Err(e) => e.into_response(),
                }
            }
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use crate::models::NamedEndpoint;
    use axum::body::Body;
    use axum::http::StatusCode;

    const HEADER: &str = "x-db-name";

    fn request(db: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/dude");
        if let Some(db) = db {
            builder = builder.header(HEADER, db);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn manager(names: &[&str]) -> Arc<ConnectionManager> {
        let mut manager = ConnectionManager::new();
        let endpoints = names
            .iter()
            .map(|n| NamedEndpoint::parse(n, "sqlite::memory:").unwrap())
            .collect();
        manager.setup(endpoints).await.unwrap();
        Arc::new(manager)
    }

    fn router(manager: Arc<ConnectionManager>) -> ConnectionRouter {
        let selector = HeaderSelector::new(HeaderName::from_static(HEADER));
        ConnectionRouter::new(manager, Arc::new(selector))
    }

    #[test]
    fn test_header_selector_uppercases() {
        let selector = HeaderSelector::new(HeaderName::from_static(HEADER));
        assert_eq!(selector.select(&request(Some("tenant_a"))), "TENANT_A");
        assert_eq!(selector.select(&request(None)), "");
    }

    #[test]
    fn test_closure_selector() {
        let selector = |_req: &Request| "fixed".to_string();
        assert_eq!(selector.select(&request(None)), "fixed");
    }

    #[tokio::test]
    async fn test_single_database_ignores_name() {
        let router = router(manager(&["only"]).await);
        for db in [None, Some("only"), Some("other")] {
            let pool = router.resolve(&request(db)).unwrap();
            assert_eq!(pool.db_type(), crate::models::DatabaseType::SQLite);
        }
    }

    #[tokio::test]
    async fn test_multiple_databases_require_selection() {
        let router = router(manager(&["a", "b"]).await);

        assert_eq!(
            router.resolve(&request(None)).unwrap_err(),
            RouteError::NoDatabaseSelected
        );
        assert!(matches!(
            router.resolve(&request(Some("c"))).unwrap_err(),
            RouteError::Lookup(crate::error::LookupError::UnknownDatabase { .. })
        ));
        assert!(router.resolve(&request(Some("b"))).is_ok());
    }

    #[tokio::test]
    async fn test_decorator_binds_connection() {
        let handler = router(manager(&["a", "b"]).await).decorate(handler_fn(
            |scope: RequestScope, _req| async move {
                match scope.connection() {
                    Ok(_) => StatusCode::OK.into_response(),
                    Err(e) => e.into_response(),
                }
            },
        ));

        let ok = handler(RequestScope::new(), request(Some("a"))).await;
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = handler(RequestScope::new(), request(None)).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = handler(RequestScope::new(), request(Some("zzz"))).await;
        assert_eq!(unknown.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
