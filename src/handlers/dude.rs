//! CRUD on the `dudes` table of whichever database the request was routed to.

use crate::error::{DbError, DbResult};
use crate::impl_db_dispatch;
use crate::middleware::RequestScope;
use crate::models::Dude;
use axum::Json;
use axum::extract::Path;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use tracing::{debug, info};

fn body(payload: Result<Json<Dude>, JsonRejection>) -> DbResult<Dude> {
    payload
        .map(|Json(dude)| dude)
        .map_err(|e| DbError::invalid_input(e.body_text()))
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> DbResult<i64> {
    path.map(|Path(id)| id)
        .map_err(|e| DbError::invalid_input(e.body_text()))
}

pub async fn create(
    scope: RequestScope,
    payload: Result<Json<Dude>, JsonRejection>,
) -> DbResult<Json<Dude>> {
    let mut dude = body(payload)?;
    let pool = scope.connection()?;

    dude.id = impl_db_dispatch!(pool, {
        MySql(p) => {
            let result = sqlx::query("INSERT INTO dudes (name, phrase) VALUES (?, ?)")
                .bind(&dude.name)
                .bind(&dude.phrase)
                .execute(p)
                .await?;
            i64::try_from(result.last_insert_id())
                .map_err(|_| DbError::internal("Inserted id out of range"))?
        },
        Postgres(p) => {
            sqlx::query_scalar::<_, i64>(
                "INSERT INTO dudes (name, phrase) VALUES ($1, $2) RETURNING id",
            )
            .bind(&dude.name)
            .bind(&dude.phrase)
            .fetch_one(p)
            .await?
        },
        SQLite(p) => {
            sqlx::query("INSERT INTO dudes (name, phrase) VALUES (?, ?)")
                .bind(&dude.name)
                .bind(&dude.phrase)
                .execute(p)
                .await?
                .last_insert_rowid()
        },
    });

    debug!(id = dude.id, "Created dude");
    Ok(Json(dude))
}

pub async fn list(scope: RequestScope) -> DbResult<Json<Vec<Dude>>> {
    const SQL: &str = "SELECT id, name, phrase FROM dudes ORDER BY id";
    let pool = scope.connection()?;

    let dudes = impl_db_dispatch!(pool, {
        MySql(p) => sqlx::query_as::<_, Dude>(SQL).fetch_all(p).await?,
        Postgres(p) => sqlx::query_as::<_, Dude>(SQL).fetch_all(p).await?,
        SQLite(p) => sqlx::query_as::<_, Dude>(SQL).fetch_all(p).await?,
    });
    Ok(Json(dudes))
}

pub async fn get_by_id(
    scope: RequestScope,
    path: Result<Path<i64>, PathRejection>,
) -> DbResult<Json<Dude>> {
    let id = path_id(path)?;
    let pool = scope.connection()?;

    let dude = impl_db_dispatch!(pool, {
        MySql(p) => {
            sqlx::query_as::<_, Dude>("SELECT id, name, phrase FROM dudes WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await?
        },
        Postgres(p) => {
            sqlx::query_as::<_, Dude>("SELECT id, name, phrase FROM dudes WHERE id = $1")
                .bind(id)
                .fetch_optional(p)
                .await?
        },
        SQLite(p) => {
            sqlx::query_as::<_, Dude>("SELECT id, name, phrase FROM dudes WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await?
        },
    });

    dude.map(Json).ok_or(DbError::NotFound)
}

/// Update by the id in the body. A missing row is not an error.
pub async fn update(
    scope: RequestScope,
    payload: Result<Json<Dude>, JsonRejection>,
) -> DbResult<StatusCode> {
    let dude = body(payload)?;
    let pool = scope.connection()?;

    let affected = impl_db_dispatch!(pool, {
        MySql(p) => {
            sqlx::query("UPDATE dudes SET name = ?, phrase = ? WHERE id = ?")
                .bind(&dude.name)
                .bind(&dude.phrase)
                .bind(dude.id)
                .execute(p)
                .await?
                .rows_affected()
        },
        Postgres(p) => {
            sqlx::query("UPDATE dudes SET name = $2, phrase = $3 WHERE id = $1")
                .bind(dude.id)
                .bind(&dude.name)
                .bind(&dude.phrase)
                .execute(p)
                .await?
                .rows_affected()
        },
        SQLite(p) => {
            sqlx::query("UPDATE dudes SET name = ?, phrase = ? WHERE id = ?")
                .bind(&dude.name)
                .bind(&dude.phrase)
                .bind(dude.id)
                .execute(p)
                .await?
                .rows_affected()
        },
    });

    if affected == 0 {
        info!(id = dude.id, "No rows affected");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    scope: RequestScope,
    path: Result<Path<i64>, PathRejection>,
) -> DbResult<StatusCode> {
    let id = path_id(path)?;
    let pool = scope.connection()?;

    let affected = impl_db_dispatch!(pool, {
        MySql(p) => {
            sqlx::query("DELETE FROM dudes WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        },
        Postgres(p) => {
            sqlx::query("DELETE FROM dudes WHERE id = $1")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        },
        SQLite(p) => {
            sqlx::query("DELETE FROM dudes WHERE id = ?")
                .bind(id)
                .execute(p)
                .await?
                .rows_affected()
        },
    });

    if affected == 0 {
        info!(id, "No rows affected");
    }
    Ok(StatusCode::NO_CONTENT)
}
