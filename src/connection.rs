//! Dialling the catalog database for [`crate::resolver::AttributeResolver::connect`].

use crate::config::DatabaseConfig;
use may_postgres::{Client, Error as PostgresError};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

#[derive(Debug)]
pub enum ConnectionError {
    /// `database.url` is neither a `postgres://` URI with a user nor a
    /// `key=value` string
    InvalidUrl(String),
    Postgres(PostgresError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::InvalidUrl(reason) => write!(f, "Invalid database url: {reason}"),
            ConnectionError::Postgres(e) => write!(f, "Could not connect to PostgreSQL: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Postgres(e) => Some(e),
            ConnectionError::InvalidUrl(_) => None,
        }
    }
}

impl From<PostgresError> for ConnectionError {
    fn from(err: PostgresError) -> Self {
        ConnectionError::Postgres(err)
    }
}

/// Check the shape of `url` without dialling.
pub fn check_url(url: &str) -> Result<(), ConnectionError> {
    let rest = url
        .strip_prefix("postgresql://")
        .or_else(|| url.strip_prefix("postgres://"));

    match rest {
        Some(authority) if authority.contains('@') => Ok(()),
        Some(_) => Err(ConnectionError::InvalidUrl(
            "uri has no user part before the host".to_string(),
        )),
        None if url.contains('=') => Ok(()),
        None => Err(ConnectionError::InvalidUrl(format!(
            "{url:?} is not a postgres:// uri or key=value string"
        ))),
    }
}

/// Open a client for `config.url`. Parks the calling coroutine while dialling.
pub fn connect(config: &DatabaseConfig) -> Result<Client, ConnectionError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::connect_span().entered();

    check_url(&config.url)?;
    let client = may_postgres::connect(&config.url)?;
    log::debug!("catalog database connection established");
    Ok(client)
}
