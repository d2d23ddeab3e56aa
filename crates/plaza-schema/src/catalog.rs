//! Catalog introspection against `information_schema`.
//!
//! Nothing is cached: every reconciliation re-reads the catalog.

use crate::schema::ColumnSet;
use crate::traced::{Connection, ConnectionExt};

const TABLE_EXISTS_SQL: &str = concat!(
    "SELECT EXISTS (",
    "SELECT FROM information_schema.tables ",
    "WHERE table_schema = 'public' ",
    "AND table_name = $1::text",
    ")"
);

const COLUMN_EXISTS_SQL: &str = concat!(
    "SELECT EXISTS (",
    "SELECT FROM information_schema.columns ",
    "WHERE table_schema = 'public' ",
    "AND table_name = $1::text ",
    "AND column_name = $2::text",
    ")"
);

const TABLE_COLUMNS_SQL: &str = concat!(
    "SELECT column_name::text AS column_name ",
    "FROM information_schema.columns ",
    "WHERE table_schema = 'public' ",
    "AND table_name = $1::text ",
    "ORDER BY ordinal_position"
);

/// Whether `table` exists in the `public` schema.
pub async fn table_exists<C: Connection>(
    conn: &C,
    table: &str,
) -> Result<bool, tokio_postgres::Error> {
    let row = conn.traced().query_one(TABLE_EXISTS_SQL, &[&table]).await?;
    Ok(row.get(0))
}

/// Whether `table` has a column called `column`.
pub async fn column_exists<C: Connection>(
    conn: &C,
    table: &str,
    column: &str,
) -> Result<bool, tokio_postgres::Error> {
    let row = conn
        .traced()
        .query_one(COLUMN_EXISTS_SQL, &[&table, &column])
        .await?;
    Ok(row.get(0))
}

/// All column names of `table`. Empty if the table does not exist.
pub async fn table_columns<C: Connection>(
    conn: &C,
    table: &str,
) -> Result<ColumnSet, tokio_postgres::Error> {
    let rows = conn.traced().query(TABLE_COLUMNS_SQL, &[&table]).await?;
    Ok(rows
        .into_iter()
        .map(|row| row.get::<_, String>("column_name"))
        .collect())
}

/// Current columns of `table`, or `None` if the table is absent.
pub async fn inspect<C: Connection>(
    conn: &C,
    table: &str,
) -> Result<Option<ColumnSet>, tokio_postgres::Error> {
    if !table_exists(conn, table).await? {
        return Ok(None);
    }
    Ok(Some(table_columns(conn, table).await?))
}
