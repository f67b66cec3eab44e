//! Data models for the dude service.

pub mod connection;
pub mod dude;

pub use connection::{DatabaseType, NamedEndpoint};
pub use dude::Dude;
