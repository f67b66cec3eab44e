//! Database dispatch macro for reducing code duplication.
//!
//! Each backend has its own sqlx pool type, so anything that touches a pool
//! is written once per variant. The macro keeps those match arms short.

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => p.size(),
///     Postgres(p) => p.size(),
///     SQLite(p) => p.size(),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;

#[cfg(test)]
mod tests {
    use crate::db::pool::DbPool;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_dispatch_reaches_matching_variant() {
        let pool = SqlitePoolOptions::new()
            .max_connections(3)
            .connect_lazy("sqlite::memory:")
            .unwrap();
        let pool = DbPool::SQLite(pool);

        let max = impl_db_dispatch!(&pool, {
            MySql(p) => p.options().get_max_connections() + 100,
            Postgres(p) => p.options().get_max_connections() + 200,
            SQLite(p) => p.options().get_max_connections(),
        });
        assert_eq!(max, 3);
    }
}
