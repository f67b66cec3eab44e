//! Database layer.
//!
//! This module provides:
//! - Named connection pool registry with setup, lookup, and shutdown
//! - Embedded schema migrations run before a pool is opened
//! - Per-pool statistics collectors
//! - Database dispatch macro for reducing code duplication

#[macro_use]
pub mod macros;
pub mod migrate;
pub mod pool;
pub mod stats;

pub use migrate::{EmbeddedMigrations, MigrationHook};
pub use pool::{ConnectionManager, DbPool};
pub use stats::{PoolStats, StatsCollector};
