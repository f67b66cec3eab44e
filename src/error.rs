//! Error types for the dude service.
//!
//! Setup-time errors abort startup. Per-request errors are rendered as HTTP
//! responses at the decorator or handler boundary and never crash the server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Invalid endpoint configuration. Fatal to setup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No databases specified")]
    NoEndpoints,

    #[error("Database with empty name")]
    EmptyName,

    #[error("Database with name {name} already exists")]
    DuplicateName { name: String },

    #[error("Invalid URL for database {name}: {message}")]
    InvalidUrl { name: String, message: String },

    #[error("Unsupported scheme '{scheme}' for database {name}")]
    UnsupportedScheme { name: String, scheme: String },
}

impl ConfigError {
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn invalid_url(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_scheme(name: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            name: name.into(),
            scheme: scheme.into(),
        }
    }
}

/// Failure of [`ConnectionManager::setup`](crate::db::ConnectionManager::setup).
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Migration failed for database {name}: {message}")]
    Migration { name: String, message: String },

    #[error("Could not connect to database {name}: {message}")]
    Connect {
        name: String,
        message: String,
        suggestion: String,
    },

    #[error("Connection manager is closed")]
    Closed,
}

impl SetupError {
    pub fn migration(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn connect(
        name: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connect {
            name: name.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connect { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Failure to resolve a logical database name to a pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Database with name {name} does not exist")]
    UnknownDatabase { name: String },

    #[error("Connection manager is closed")]
    Closed,
}

impl LookupError {
    pub fn unknown_database(name: impl Into<String>) -> Self {
        Self::UnknownDatabase { name: name.into() }
    }
}

/// Per-request routing failure raised by the connection router.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("No database specified")]
    NoDatabaseSelected,

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoDatabaseSelected => StatusCode::BAD_REQUEST,
            Self::Lookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        warn!(error = %self, "Request routing failed");
        let code = match &self {
            Self::NoDatabaseSelected => "no_database_selected",
            Self::Lookup(LookupError::UnknownDatabase { .. }) => "unknown_database",
            Self::Lookup(LookupError::Closed) => "unavailable",
        };
        error_response(self.status(), code, self.to_string())
    }
}

/// A handler read a scoped value that no decorator bound. Always a wiring bug.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Request scope value '{key}' was resolved before it was bound")]
    Unbound { key: &'static str },
}

impl IntoResponse for ScopeError {
    fn into_response(self) -> Response {
        error!(error = %self, "Request pipeline is miswired");
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal server error",
        )
    }
}

/// Errors raised by resource handlers.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("Not found")]
    NotFound,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl DbError {
    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::Connection { .. } | Self::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database { .. } | Self::Internal { .. } | Self::Scope(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => DbError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("Protocol error: {}", msg)),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        match self {
            // Already logged loudly by ScopeError itself.
            Self::Scope(scope_err) => scope_err.into_response(),
            Self::NotFound => error_response(StatusCode::NOT_FOUND, "not_found", "Not found"),
            Self::InvalidInput { .. } => {
                error_response(StatusCode::BAD_REQUEST, "invalid_input", self.to_string())
            }
            _ => {
                warn!(error = %self, retryable = self.is_retryable(), "Request failed");
                let code = if self.is_retryable() {
                    "unavailable"
                } else {
                    "database"
                };
                error_response(self.status(), code, self.to_string())
            }
        }
    }
}

/// Failure to bind or run the HTTP server.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Result type alias for handler operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build the JSON error body shared by every failure response.
pub fn error_response(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    #[derive(Serialize)]
    struct ErrorResponse {
        error: ErrorDetail,
    }
    #[derive(Serialize)]
    struct ErrorDetail {
        code: &'static str,
        message: String,
    }

    let body = ErrorResponse {
        error: ErrorDetail {
            code,
            message: message.into(),
        },
    };
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::duplicate_name("PRIMARY");
        assert_eq!(err.to_string(), "Database with name PRIMARY already exists");
    }

    #[test]
    fn test_setup_error_wraps_configuration() {
        let err: SetupError = ConfigError::EmptyName.into();
        assert!(matches!(err, SetupError::Configuration(ConfigError::EmptyName)));
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn test_setup_error_suggestion() {
        let err = SetupError::connect("A", "refused", "Check the server");
        assert_eq!(err.suggestion(), Some("Check the server"));
        assert_eq!(SetupError::Closed.suggestion(), None);
    }

    #[test]
    fn test_route_error_status() {
        assert_eq!(
            RouteError::NoDatabaseSelected.status(),
            StatusCode::BAD_REQUEST
        );
        let err: RouteError = LookupError::unknown_database("X").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_route_error_response() {
        let response = RouteError::NoDatabaseSelected.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_scope_error_is_server_error() {
        let response = ScopeError::Unbound { key: "connection" }.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_db_error_retryable() {
        assert!(DbError::timeout("query").is_retryable());
        assert!(DbError::connection("err").is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
    }

    #[test]
    fn test_db_error_status() {
        assert_eq!(DbError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            DbError::from(sqlx::Error::PoolClosed).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert!(matches!(
            DbError::from(sqlx::Error::RowNotFound),
            DbError::NotFound
        ));
    }
}
