//! Opening connections.
//!
//! Each operation opens its own connection and drops it when done; there is
//! no pool.

use tokio_postgres::Client;
use tracing::{debug, info};

use crate::config::{DbConfig, LOCAL_TIMEZONE};
use crate::error::{Error, describe};
use crate::schema::quote_ident;
use crate::tls::make_connector;
use crate::traced::ConnectionExt;

/// Database that is always present on a Postgres server.
const MAINTENANCE_DATABASE: &str = "postgres";

/// Connect to the configured database with the session timezone set to portal-local time.
///
/// Every failure here, including the session setup, is a connection error.
pub async fn connect(config: &DbConfig) -> Result<Client, Error> {
    let client = open(config, &config.database).await?;
    client
        .traced()
        .batch_execute(&format!("SET timezone = '{}'", LOCAL_TIMEZONE))
        .await
        .map_err(Error::Connection)?;
    Ok(client)
}

/// Connect to the server's maintenance database, for server-level statements.
pub async fn connect_maintenance(config: &DbConfig) -> Result<Client, Error> {
    open(config, MAINTENANCE_DATABASE).await
}

async fn open(config: &DbConfig, database: &str) -> Result<Client, Error> {
    debug!(
        host = %config.host,
        port = config.port,
        database,
        ssl_mode = ?config.ssl_mode,
        "connecting"
    );
    let tls = make_connector()?;
    let (client, connection) = config
        .pg_config(database)
        .connect(tls)
        .await
        .map_err(Error::Connection)?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %describe(&e), "database connection error");
        }
    });

    Ok(client)
}

/// Result of [`create_database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOutcome {
    Created,
    AlreadyExists,
}

/// Create the configured database if the server does not have it yet.
///
/// Runs outside a transaction; `CREATE DATABASE` cannot run inside one.
pub async fn create_database(config: &DbConfig) -> Result<DatabaseOutcome, Error> {
    let client = connect_maintenance(config).await?;
    let conn = client.traced();

    let exists = conn
        .query_opt(
            "SELECT 1 FROM pg_database WHERE datname = $1",
            &[&config.database],
        )
        .await?
        .is_some();

    if exists {
        info!("Database '{}' already exists.", config.database);
        return Ok(DatabaseOutcome::AlreadyExists);
    }

    conn.batch_execute(&format!(
        "CREATE DATABASE {}",
        quote_ident(&config.database)
    ))
    .await?;
    info!("Database '{}' created successfully!", config.database);
    Ok(DatabaseOutcome::Created)
}
