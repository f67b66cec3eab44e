//! Resource handlers served behind the decorator pipeline.

pub mod dude;

use crate::middleware::expose_matched_path;
use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post};

/// Routes for the `dude` resource.
///
/// Every handler expects a [`RequestScope`](crate::middleware::RequestScope)
/// with a bound connection, so mount this through
/// [`router_handler`](crate::middleware::router_handler).
pub fn routes() -> Router {
    Router::new()
        .route(
            "/dude",
            post(dude::create).get(dude::list).put(dude::update),
        )
        .route("/dude/{id}", get(dude::get_by_id).delete(dude::delete))
        .route_layer(from_fn(expose_matched_path))
}
