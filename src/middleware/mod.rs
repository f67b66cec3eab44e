//! Request decorators and their composition.
//!
//! A [`Decorator`] wraps a [`BoxedHandler`] in another handler, adding work
//! before and after the wrapped one runs. [`compose`] folds an ordered list
//! of decorators into a single [`Pipeline`]; the first decorator listed is
//! the outermost, so for `[D1, D2]` around `H` a request runs
//! `D1 -> D2 -> H -> D2 -> D1`.
//!
//! Composition does no I/O and keeps no state, so one pipeline can wrap any
//! number of handlers and serve any number of concurrent requests.

pub mod observe;
pub mod request_id;
pub mod router;
pub mod scope;

pub use observe::{ObserveDecorator, expose_matched_path};
pub use request_id::{REQUEST_ID_HEADER, RequestIdDecorator};
pub use router::{ConnectionRouter, HeaderSelector, Selector};
pub use scope::{RequestId, RequestScope};

use axum::extract::Request;
use axum::response::Response;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceExt;

/// A type-erased, cheaply cloneable request handler.
pub type BoxedHandler =
    Arc<dyn Fn(RequestScope, Request) -> BoxFuture<'static, Response> + Send + Sync + 'static>;

/// Wrap an async function as a [`BoxedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> BoxedHandler
where
    F: Fn(RequestScope, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |scope: RequestScope, req: Request| f(scope, req).boxed())
}

/// Transforms a handler into a wrapped handler.
pub trait Decorator: Send + Sync {
    fn decorate(&self, next: BoxedHandler) -> BoxedHandler;
}

/// A [`Decorator`] backed by a closure.
pub struct FnDecorator<F>(F);

pub fn decorator_fn<F>(f: F) -> FnDecorator<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync,
{
    FnDecorator(f)
}

impl<F> Decorator for FnDecorator<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync,
{
    fn decorate(&self, next: BoxedHandler) -> BoxedHandler {
        (self.0)(next)
    }
}

/// Ordered decorators applied as one.
#[derive(Clone, Default)]
pub struct Pipeline {
    decorators: Vec<Arc<dyn Decorator>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decorator; it runs inside every decorator added before it.
    pub fn with(mut self, decorator: impl Decorator + 'static) -> Self {
        self.decorators.push(Arc::new(decorator));
        self
    }

    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("decorators", &self.decorators.len())
            .finish()
    }
}

impl Decorator for Pipeline {
    fn decorate(&self, handler: BoxedHandler) -> BoxedHandler {
        // Wrap innermost first so the first decorator ends up outermost.
        self.decorators
            .iter()
            .rev()
            .fold(handler, |next, decorator| decorator.decorate(next))
    }
}

/// Combine `decorators` into one; the first listed is the outermost.
pub fn compose(decorators: Vec<Arc<dyn Decorator>>) -> Pipeline {
    Pipeline { decorators }
}

/// Terminal handler that dispatches to an axum router.
///
/// The scope is stored in the request extensions, where handlers pick it up
/// through the [`RequestScope`] extractor.
pub fn router_handler(router: axum::Router) -> BoxedHandler {
    Arc::new(move |scope: RequestScope, mut req: Request| {
        req.extensions_mut().insert(scope);
        let router = router.clone();
        async move {
            match router.oneshot(req).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        }
        .boxed()
    })
}

/// Serve `handler` for every request, starting each with an empty scope.
pub fn into_router(handler: BoxedHandler) -> axum::Router {
    axum::Router::new().fallback(move |req: Request| {
        let handler = handler.clone();
        async move { handler(RequestScope::new(), req).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(name: &'static str, log: Log) -> impl Decorator {
        decorator_fn(move |next: BoxedHandler| {
            let log = log.clone();
            handler_fn(move |scope, req| {
                let log = log.clone();
                let next = next.clone();
                async move {
                    log.lock().unwrap().push(format!("{}-pre", name));
                    let response = next(scope, req).await;
                    log.lock().unwrap().push(format!("{}-post", name));
                    response
                }
            })
        })
    }

    fn recording_handler(log: Log) -> BoxedHandler {
        handler_fn(move |_scope, _req| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                StatusCode::OK.into_response()
            }
        })
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_first_decorator_is_outermost() {
        let log: Log = Arc::default();
        let pipeline = compose(vec![
            Arc::new(recorder("d1", log.clone())) as Arc<dyn Decorator>,
            Arc::new(recorder("d2", log.clone())),
        ]);

        let handler = pipeline.decorate(recording_handler(log.clone()));
        handler(RequestScope::new(), request()).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["d1-pre", "d2-pre", "handler", "d2-post", "d1-post"]
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_identity() {
        let log: Log = Arc::default();
        let pipeline = Pipeline::new();
        assert!(pipeline.is_empty());

        let handler = pipeline.decorate(recording_handler(log.clone()));
        let response = handler(RequestScope::new(), request()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }

    #[tokio::test]
    async fn test_pipeline_reused_across_handlers() {
        let log: Log = Arc::default();
        let pipeline = Pipeline::new().with(recorder("outer", log.clone()));
        assert_eq!(pipeline.len(), 1);

        let first = pipeline.decorate(recording_handler(log.clone()));
        let second = pipeline.decorate(recording_handler(log.clone()));
        first(RequestScope::new(), request()).await;
        second(RequestScope::new(), request()).await;

        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner() {
        let log: Log = Arc::default();
        let deny = decorator_fn(|_next: BoxedHandler| {
            handler_fn(|_scope, _req| async { StatusCode::FORBIDDEN.into_response() })
        });
        let pipeline = Pipeline::new()
            .with(recorder("outer", log.clone()))
            .with(deny);

        let handler = pipeline.decorate(recording_handler(log.clone()));
        let response = handler(RequestScope::new(), request()).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), vec!["outer-pre", "outer-post"]);
    }

    #[tokio::test]
    async fn test_router_handler_exposes_scope() {
        let router = axum::Router::new().route(
            "/",
            axum::routing::get(|scope: RequestScope| async move {
                scope.request_id().map(|id| id.to_string())
            }),
        );
        let handler = router_handler(router);

        let scope = RequestScope::new().with_request_id(RequestId::new("rid-1"));
        let response = handler(scope, request()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"rid-1");
    }
}
