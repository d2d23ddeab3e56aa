//! Schema bootstrap for the Plaza Portal database.
//!
//! This crate provides:
//! - The portal's four tables (`users`, `idr_master`, `scope`,
//!   `document_master`) as Rust definitions
//! - Create-or-patch reconciliation driven by `information_schema`
//! - The add-user operation used to seed accounts
//!
//! # Reconciliation
//!
//! There is no migration history table. Every run introspects the catalog,
//! plans the changes a table needs, and applies them in one transaction per
//! table:
//!
//! ```text
//! {absent} --create--> {exists-v1} --patch--> {exists-vN}
//! ```
//!
//! Running it again on an up-to-date database issues no DDL.
//!
//! ```ignore
//! let config = DbConfig::from_env()?;
//! let reconciler = Reconciler::new(config);
//! reconciler.ensure_all().await?;
//! ```

pub mod catalog;
pub mod config;
mod connect;
mod error;
pub mod plan;
mod reconcile;
pub mod schema;
pub mod tables;
mod tls;
mod traced;
mod users;

pub use config::{ConfigError, DbConfig, DbType, SslMode};
pub use connect::{DatabaseOutcome, connect, create_database};
pub use error::{Error, ValidationError};
pub use plan::{Change, TablePlan, plan_table};
pub use reconcile::{Outcome, Reconciler};
pub use schema::{Column, ColumnSet, Patch, PgType, Table};
pub use traced::{Connection, ConnectionExt, TracedConn};
pub use users::{CreatedUser, NewUser, add_user};

/// Result type for plaza-schema operations.
pub type Result<T> = std::result::Result<T, Error>;
