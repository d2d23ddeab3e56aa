//! Traced database access.
//!
//! Every catalog query and DDL statement goes through [`TracedConn`], which
//! wraps a client or an open transaction and logs each statement via tracing.

use std::future::Future;
use std::pin::Pin;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::{Instrument, Span, field};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// A borrowed client or transaction whose statements are logged as spans.
///
/// ```ignore
/// let tx = client.transaction().await?;
/// tx.traced()
///     .execute("ALTER TABLE users ADD COLUMN plaza_name VARCHAR(255)", &[])
///     .await?;
/// ```
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

/// Span shared by the row-returning calls; `rows` is filled in afterwards.
fn query_span(sql: &str, params: usize) -> Span {
    tracing::debug_span!("db.query", sql = %sql, params, rows = field::Empty)
}

impl<'a, C: Connection> TracedConn<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Run a statement, returning the number of rows it touched.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, Error> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = field::Empty,
        );
        let affected = self.conn.execute(sql, params).instrument(span.clone()).await?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Run statements over the simple query protocol.
    ///
    /// `CREATE DATABASE` and `SET` go through here.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("db.batch_execute", sql = %sql);
        self.conn.batch_execute(sql).instrument(span).await
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = query_span(sql, params.len());
        let rows = self.conn.query(sql, params).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, Error> {
        let span = query_span(sql, params.len());
        let row = self.conn.query_opt(sql, params).instrument(span.clone()).await?;
        span.record("rows", usize::from(row.is_some()));
        Ok(row)
    }

    /// Errors unless the query yields exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row, Error> {
        let span = query_span(sql, params.len());
        let row = self.conn.query_one(sql, params).instrument(span.clone()).await?;
        span.record("rows", 1usize);
        Ok(row)
    }
}

/// `.traced()` on anything that implements [`Connection`].
pub trait ConnectionExt: Connection + Sized {
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}

/// Anything statements can be sent through.
///
/// Implemented for `tokio_postgres::Client` and `tokio_postgres::Transaction`.
pub trait Connection: Send + Sync {
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, u64>;

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()>;

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Vec<Row>>;

    fn query_opt<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Option<Row>>;

    fn query_one<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Row>;
}

macro_rules! forward_connection {
    ($ty:ty) => {
        impl Connection for $ty {
            fn execute<'a>(
                &'a self,
                sql: &'a str,
                params: &'a [&'a (dyn ToSql + Sync)],
            ) -> BoxFuture<'a, u64> {
                Box::pin(<$ty>::execute(self, sql, params))
            }

            fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
                Box::pin(<$ty>::batch_execute(self, sql))
            }

            fn query<'a>(
                &'a self,
                sql: &'a str,
                params: &'a [&'a (dyn ToSql + Sync)],
            ) -> BoxFuture<'a, Vec<Row>> {
                Box::pin(<$ty>::query(self, sql, params))
            }

            fn query_opt<'a>(
                &'a self,
                sql: &'a str,
                params: &'a [&'a (dyn ToSql + Sync)],
            ) -> BoxFuture<'a, Option<Row>> {
                Box::pin(<$ty>::query_opt(self, sql, params))
            }

            fn query_one<'a>(
                &'a self,
                sql: &'a str,
                params: &'a [&'a (dyn ToSql + Sync)],
            ) -> BoxFuture<'a, Row> {
                Box::pin(<$ty>::query_one(self, sql, params))
            }
        }
    };
}

// Inherent methods win over the trait's in `<$ty>::method` paths.
forward_connection!(tokio_postgres::Client);
forward_connection!(tokio_postgres::Transaction<'_>);
