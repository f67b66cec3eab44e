//! Assigns every request an id and a tracing span carrying it.

use crate::middleware::{BoxedHandler, Decorator, RequestId, RequestScope};
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use futures_util::FutureExt;
use std::sync::Arc;
use tracing::{Instrument, info_span};

/// Response header echoing the request id back to the client.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Binds a fresh [`RequestId`] into the scope of every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdDecorator;

impl Decorator for RequestIdDecorator {
    fn decorate(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(move |scope: RequestScope, req: Request| {
            let next = next.clone();
            let id = RequestId::generate();
            // Every log line below this point carries the request id.
            let span = info_span!(
                "request",
                request_id = %id,
                method = %req.method(),
                uri = %req.uri(),
            );
            async move {
                let mut response = next(scope.with_request_id(id.clone()), req).await;
                if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                    response.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                response
            }
            .instrument(span)
            .boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;
    use axum::body::Body;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_id_bound_and_echoed() {
        let handler = RequestIdDecorator.decorate(handler_fn(|scope, _req| async move {
            match scope.request_id() {
                Ok(id) => id.to_string().into_response(),
                Err(e) => e.into_response(),
            }
        }));

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = handler(RequestScope::new(), req).await;

        let header = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(header.as_bytes(), &body[..]);
        assert!(!header.is_empty());
    }
}
