//! Connection settings for the portal database.
//!
//! Settings come from `DB_*` environment variables, with a `.env` file in the
//! working directory (or any parent) loaded first. The environment is read
//! once; the resulting [`DbConfig`] is handed to every operation.

use std::fmt;

use thiserror::Error;
pub use tokio_postgres::config::SslMode;

/// Database name used when `DB_NAME` is unset.
pub const DEFAULT_DATABASE: &str = "plaza_web";

/// Session timezone. Timestamps are stored zone-naive in this zone.
pub const LOCAL_TIMEZONE: &str = "Asia/Kolkata";

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
}

impl DbType {
    /// Parse a `DB_TYPE` value, case-insensitively.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DbType::Postgres),
            other => Err(ConfigError::UnsupportedDbType(other.to_string())),
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbType::Postgres => write!(f, "postgresql"),
        }
    }
}

/// Errors that can occur when reading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported database type '{0}'. Supported types: postgresql")]
    UnsupportedDbType(String),

    #[error("DB_PORT must be a port number, got '{0}'")]
    InvalidPort(String),

    #[error("Unsupported DB_SSLMODE '{0}'. Supported modes: disable, prefer, require")]
    InvalidSslMode(String),
}

/// Parse a `DB_SSLMODE` value, using libpq's names.
pub fn parse_ssl_mode(value: &str) -> Result<SslMode, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => Err(ConfigError::InvalidSslMode(other.to_string())),
    }
}

/// Everything needed to open a connection.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub db_type: DbType,
    /// TLS negotiation; `prefer` unless `DB_SSLMODE` says otherwise.
    pub ssl_mode: SslMode,
}

impl DbConfig {
    /// Load `.env` (if any) and read the `DB_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// Empty values count as unset, except `DB_PASSWORD` which is simply empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let db_type = DbType::parse(&get("DB_TYPE", "postgresql"))?;

        let port_str = get("DB_PORT", "5432");
        let port = port_str
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port_str.clone()))?;

        let ssl_mode = parse_ssl_mode(&get("DB_SSLMODE", "prefer"))?;

        Ok(Self {
            host: get("DB_HOST", "localhost"),
            port,
            user: get("DB_USER", "postgres"),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            database: get("DB_NAME", DEFAULT_DATABASE),
            db_type,
            ssl_mode,
        })
    }

    /// Whether `DB_PASSWORD` was left empty.
    pub fn password_missing(&self) -> bool {
        self.password.is_empty()
    }

    /// `user@host:port/database`, safe to log.
    pub fn display_target(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    /// A `tokio_postgres::Config` for the given database name.
    pub(crate) fn pg_config(&self, database: &str) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(database)
            .ssl_mode(self.ssl_mode);
        if !self.password.is_empty() {
            config.password(&self.password);
        }
        config
    }
}

// Keep the password out of debug output.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("db_type", &self.db_type)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}
