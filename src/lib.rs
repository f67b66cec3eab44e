//! Dude service library
//!
//! A small CRUD service that routes every request to one of several named
//! SQL databases (SQLite, PostgreSQL, MySQL), chosen per request through a
//! composable decorator pipeline.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod transport;

pub use config::Config;
pub use db::ConnectionManager;
pub use error::{DbError, SetupError};
