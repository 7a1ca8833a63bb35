//! Error types for db-pack.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Registry lookups fail with [`DbError::NotFound`] or [`DbError::AmbiguousDefault`];
//! everything raised by the database client is mapped onto the upstream variants
//! (`Connection`, `Database`, `Timeout`, `Internal`).

use crate::config::DEFAULT_ACQUIRE_TIMEOUT_SECS;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("No matching pool found for {user}@{host}:{port}/{database}")]
    NotFound {
        user: String,
        host: String,
        port: u16,
        database: String,
    },

    #[error(
        "A default connection pool could not be determined ({registered} pools registered). Pass an explicit configuration."
    )]
    AmbiguousDefault { registered: usize },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a not found error for the given connection coordinates.
    pub fn not_found(
        user: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            user: user.into(),
            host: host.into(),
            port,
            database: database.into(),
        }
    }

    /// Create an ambiguous default error.
    pub fn ambiguous_default(registered: usize) -> Self {
        Self::AmbiguousDefault { registered }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::NotFound { .. } => Some("Call create_pool with this configuration first"),
            Self::AmbiguousDefault { .. } => {
                Some("Pass the configuration explicitly or set a default configuration")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error was raised by the database client rather than the registry.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Database { .. }
                | Self::Timeout { .. }
                | Self::Internal { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection parameters and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => {
                DbError::timeout("connection pool acquire", DEFAULT_ACQUIRE_TIMEOUT_SECS)
            }
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "The pool was ended; create it again before use",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and that a TLS feature is enabled",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
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

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = DbError::not_found("alice", "localhost", 5432, "app");
        assert_eq!(
            err.to_string(),
            "No matching pool found for alice@localhost:5432/app"
        );
    }

    #[test]
    fn test_ambiguous_default_display() {
        let err = DbError::ambiguous_default(2);
        let msg = err.to_string();
        assert!(msg.contains("2 pools registered"));
        assert!(msg.contains("explicit configuration"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::ambiguous_default(0).suggestion().is_some());
        assert!(DbError::internal("boom").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("acquire", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::not_found("u", "h", 1, "d").is_retryable());
    }

    #[test]
    fn test_upstream_classification() {
        assert!(DbError::connection("err", "sugg").is_upstream());
        assert!(DbError::database("err", None, "sugg").is_upstream());
        assert!(!DbError::not_found("u", "h", 1, "d").is_upstream());
        assert!(!DbError::ambiguous_default(3).is_upstream());
        assert!(!DbError::invalid_input("bad").is_upstream());
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Timeout { .. }));
        assert!(err.is_retryable());
    }
}
