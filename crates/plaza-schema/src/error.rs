use std::error::Error as _;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {}", describe(.0))]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Error connecting to database: {}", describe(.0))]
    Connection(#[source] tokio_postgres::Error),

    #[error("Error setting up TLS: {0}")]
    Tls(#[from] rustls::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("error creating/altering {table} table: {}", describe(.source))]
    Reconcile {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// Rejections raised before anything is written by [`add_user`](crate::add_user).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name, email_id, password, and role are required fields (missing {0})")]
    MissingField(&'static str),

    #[error("User with email '{0}' already exists")]
    DuplicateEmail(String),
}

impl Error {
    /// Whether this failure happened before any statement could be sent.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Tls(_))
    }

    /// Tag a driver error with the table whose reconciliation it interrupted.
    pub(crate) fn reconcile(table: &str, source: tokio_postgres::Error) -> Self {
        Error::Reconcile {
            table: table.to_string(),
            source,
        }
    }
}

/// Render a driver error with its cause.
///
/// `tokio_postgres::Error` displays only its kind ("db error"); the server's
/// message lives in the source chain.
pub(crate) fn describe(err: &tokio_postgres::Error) -> String {
    if let Some(db) = err.as_db_error() {
        return match db.detail() {
            Some(detail) => format!("{} (DETAIL: {})", db.message(), detail),
            None => db.message().to_string(),
        };
    }

    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
