//! HTTP serving for the dude service.

pub mod http;

pub use http::{HttpTransport, build_app};
