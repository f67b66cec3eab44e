//! Schema migrations applied during setup.
//!
//! Migrations run on a dedicated pool opened from the stripped URL,
//! before the endpoint's pool exists. A database that is already up to date
//! is not an error.

use crate::models::DatabaseType;
use futures_util::future::BoxFuture;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;

static POSTGRES_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/postgres");
static MYSQL_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/mysql");
static SQLITE_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/sqlite");

/// Hook run against each endpoint's URL before its pool is opened.
pub trait MigrationHook: Send + Sync {
    fn migrate<'a>(
        &'a self,
        db_type: DatabaseType,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), MigrateError>>;
}

/// The migrations compiled into this binary, one set per backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMigrations;

impl EmbeddedMigrations {
    pub fn migrator(db_type: DatabaseType) -> &'static Migrator {
        match db_type {
            DatabaseType::PostgreSQL => &POSTGRES_MIGRATIONS,
            DatabaseType::MySQL => &MYSQL_MIGRATIONS,
            DatabaseType::SQLite => &SQLITE_MIGRATIONS,
        }
    }

    /// Apply pending migrations through a single-connection pool that is
    /// closed again before returning.
    async fn run(db_type: DatabaseType, url: &str) -> Result<(), MigrateError> {
        let migrator = Self::migrator(db_type);
        match db_type {
            DatabaseType::PostgreSQL => {
                let pool = PgPoolOptions::new().max_connections(1).connect(url).await?;
                let result = migrator.run(&pool).await;
                pool.close().await;
                result
            }
            DatabaseType::MySQL => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await?;
                let result = migrator.run(&pool).await;
                pool.close().await;
                result
            }
            DatabaseType::SQLite => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(url)
                    .await?;
                let result = migrator.run(&pool).await;
                pool.close().await;
                result
            }
        }
    }
}

impl MigrationHook for EmbeddedMigrations {
    fn migrate<'a>(
        &'a self,
        db_type: DatabaseType,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(), MigrateError>> {
        Box::pin(Self::run(db_type, url))
    }
}
