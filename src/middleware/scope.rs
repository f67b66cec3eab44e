//! Per-request scope carrying values bound by decorators.
//!
//! A scope is never mutated in place. Binding a value derives a new scope,
//! so requests running side by side can never see each other's bindings.

use crate::db::DbPool;
use crate::error::ScopeError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use uuid::Uuid;

/// Opaque identifier assigned to each request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id: a random UUID, base64 encoded without padding.
    pub fn generate() -> Self {
        Self(STANDARD_NO_PAD.encode(Uuid::new_v4().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    request_id: Option<RequestId>,
    connection: Option<DbPool>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a scope with `id` bound as the request id.
    pub fn with_request_id(&self, id: RequestId) -> Self {
        Self {
            request_id: Some(id),
            connection: self.connection.clone(),
        }
    }

    /// Derive a scope with `pool` bound as the request's connection.
    pub fn with_connection(&self, pool: DbPool) -> Self {
        Self {
            request_id: self.request_id.clone(),
            connection: Some(pool),
        }
    }

    pub fn request_id(&self) -> Result<&RequestId, ScopeError> {
        self.request_id
            .as_ref()
            .ok_or(ScopeError::Unbound { key: "request_id" })
    }

    pub fn connection(&self) -> Result<&DbPool, ScopeError> {
        self.connection
            .as_ref()
            .ok_or(ScopeError::Unbound { key: "connection" })
    }
}

/// Handlers behind the pipeline take the scope as an extractor.
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = ScopeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestScope>()
            .cloned()
            .ok_or(ScopeError::Unbound { key: "scope" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn lazy_pool() -> DbPool {
        DbPool::SQLite(
            SqlitePoolOptions::new()
                .connect_lazy("sqlite::memory:")
                .unwrap(),
        )
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        // 16 bytes, base64 without padding
        assert_eq!(a.as_str().len(), 22);
    }

    #[test]
    fn test_unbound_values_fail() {
        let scope = RequestScope::new();
        assert_eq!(
            scope.request_id().unwrap_err(),
            ScopeError::Unbound { key: "request_id" }
        );
        assert_eq!(
            scope.connection().unwrap_err(),
            ScopeError::Unbound { key: "connection" }
        );
    }

    #[tokio::test]
    async fn test_binding_derives_new_scope() {
        let root = RequestScope::new();
        let with_id = root.with_request_id(RequestId::new("abc"));
        let with_both = with_id.with_connection(lazy_pool());

        assert!(root.request_id().is_err());
        assert!(with_id.connection().is_err());
        assert_eq!(with_both.request_id().unwrap().as_str(), "abc");
        assert!(with_both.connection().is_ok());
    }

    #[tokio::test]
    async fn test_sibling_scopes_are_independent() {
        let root = RequestScope::new().with_request_id(RequestId::new("parent"));
        let left = root.with_request_id(RequestId::new("left"));
        let right = root.with_connection(lazy_pool());

        assert_eq!(left.request_id().unwrap().as_str(), "left");
        assert!(left.connection().is_err());
        assert_eq!(right.request_id().unwrap().as_str(), "parent");
    }
}
