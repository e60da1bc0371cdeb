//! Error types for store access and resolution.
//!
//! Store errors stay below the resolver: the adapter folds them into the
//! degraded outcomes documented on [`crate::resolver::AttributeResolver`].
//! Only [`ResolveError`] crosses the public API.

use may_postgres::Error as PostgresError;
use std::fmt;

/// SQLSTATE reported by PostgreSQL when a referenced column does not exist.
pub const UNDEFINED_COLUMN_SQLSTATE: &str = "42703";

/// Error raised by a category or attribute store.
#[derive(Debug)]
pub enum StoreError {
    /// A column named by the query does not exist in this deployment.
    MissingColumn {
        /// SQLSTATE or backend code that identified the condition.
        code: String,
        /// Backend message; names the missing column.
        message: String,
    },
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// A row could not be decoded into a record
    Decode(String),
    /// The query could not be built or its parameters bound
    Query(String),
    /// The store is unreachable or refused the request
    Unavailable(String),
}

impl StoreError {
    /// Missing-column error for `column`, as a backend would phrase it.
    pub fn missing_column(table: &str, column: &str) -> Self {
        StoreError::MissingColumn {
            code: UNDEFINED_COLUMN_SQLSTATE.to_string(),
            message: format!("column {table}.{column} does not exist"),
        }
    }

    /// True only for a missing-column error whose message names `column`.
    ///
    /// Any other failure, including a missing-column error about a different
    /// column, is a real failure and must not trigger the legacy retry.
    pub fn is_missing_column(&self, column: &str) -> bool {
        match self {
            StoreError::MissingColumn { code, message } => {
                code == UNDEFINED_COLUMN_SQLSTATE && message.contains(column)
            }
            _ => false,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::MissingColumn { code, message } => {
                write!(f, "Missing column ({code}): {message}")
            }
            StoreError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            StoreError::Decode(s) => write!(f, "Decode error: {s}"),
            StoreError::Query(s) => write!(f, "Query error: {s}"),
            StoreError::Unavailable(s) => write!(f, "Store unavailable: {s}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        if let Some(db_error) = err.as_db_error() {
            if db_error.code().code() == UNDEFINED_COLUMN_SQLSTATE {
                return StoreError::MissingColumn {
                    code: UNDEFINED_COLUMN_SQLSTATE.to_string(),
                    message: db_error.message().to_string(),
                };
            }
        }
        StoreError::Postgres(err)
    }
}

/// Error returned by [`crate::resolver::AttributeResolver`].
///
/// Not-found categories and failed fetches are not errors; they resolve to
/// empty attribute sets. What remains is cancellation and setup failures.
#[derive(Debug)]
pub enum ResolveError {
    /// The caller cancelled the resolution during a store round trip
    Cancelled,
    /// Stores could not be constructed
    Connection(crate::connection::ConnectionError),
    /// Settings could not be loaded
    Config(config::ConfigError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Cancelled => write!(f, "resolution cancelled"),
            ResolveError::Connection(e) => write!(f, "Connection error: {e}"),
            ResolveError::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<crate::connection::ConnectionError> for ResolveError {
    fn from(err: crate::connection::ConnectionError) -> Self {
        ResolveError::Connection(err)
    }
}

impl From<config::ConfigError> for ResolveError {
    fn from(err: config::ConfigError) -> Self {
        ResolveError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_matches_named_column_only() {
        let err = StoreError::missing_column("category_attributes", "is_active");
        assert!(err.is_missing_column("is_active"));
        assert!(!err.is_missing_column("attribute_key"));
    }

    #[test]
    fn test_missing_column_requires_sqlstate() {
        let err = StoreError::MissingColumn {
            code: "42P01".to_string(),
            message: "relation is_active does not exist".to_string(),
        };
        assert!(!err.is_missing_column("is_active"));
    }

    #[test]
    fn test_other_errors_are_not_missing_column() {
        let err = StoreError::Query("column is_active does not exist".to_string());
        assert!(!err.is_missing_column("is_active"));
        assert!(err.to_string().contains("Query error"));
    }

    #[test]
    fn test_resolve_error_display() {
        assert_eq!(ResolveError::Cancelled.to_string(), "resolution cancelled");
    }
}
