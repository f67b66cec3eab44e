//! Per-pool statistics collectors.
//!
//! Setup registers one collector per database name. Each scrape of
//! `/metrics` reads every collector into Prometheus gauges.

use crate::db::pool::DbPool;
use crate::models::DatabaseType;

/// Point-in-time view of one pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    pub db_type: DatabaseType,
    pub max_connections: u32,
    /// Open connections, idle or checked out
    pub open: u32,
    pub idle: usize,
    pub in_use: u32,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub struct StatsCollector {
    name: String,
    pool: DbPool,
}

impl StatsCollector {
    pub fn new(name: impl Into<String>, pool: DbPool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collect(&self) -> PoolStats {
        let open = self.pool.size();
        let idle = self.pool.num_idle();
        PoolStats {
            name: self.name.clone(),
            db_type: self.pool.db_type(),
            max_connections: self.pool.max_connections(),
            open,
            idle,
            in_use: open.saturating_sub(u32::try_from(idle).unwrap_or(u32::MAX)),
            closed: self.pool.is_closed(),
        }
    }
}
