//! Query execution over `may_postgres`.
//!
//! The PostgreSQL stores only read, so the executor surface is a single
//! `query_all`. Every call is timed, traced and counted.

use crate::error::StoreError;
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Trait for executing read queries
///
/// Implemented by [`MayPostgresExecutor`]; the stores are generic over it so
/// a pooled or transactional client can be substituted.
pub trait QueryExecutor: Send + Sync {
    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingColumn` when PostgreSQL reports SQLSTATE
    /// 42703, `StoreError::Postgres` for any other database failure.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError>;
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for Arc<E> {
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        (**self).query_all(query, params)
    }
}

/// Implementation of `QueryExecutor` for `may_postgres::Client`
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl QueryExecutor for MayPostgresExecutor {
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::store_query_span(query).entered();

        let start = Instant::now();
        let result = self.client.query(query, params).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_query_error();
            StoreError::from(e)
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_query_duration(duration);
        log::trace!("query finished in {duration:?}: {query}");

        result
    }
}
