//! Create-or-patch reconciliation of the portal tables.
//!
//! Each `ensure_*` call opens its own connection, runs inside one
//! transaction, and either commits every change for that table or none of
//! them. Tables are independent: a failure on one leaves the ones before it
//! committed.
//!
//! There is no lock around the introspect-then-alter sequence. Two runs
//! racing on the same database can both decide a column is missing, and the
//! loser fails on the duplicate column and rolls back.

use tracing::{error, info, warn};

use crate::catalog;
use crate::config::DbConfig;
use crate::connect::connect;
use crate::error::Error;
use crate::plan::{Change, TablePlan, plan_table};
use crate::schema::Table;
use crate::tables;
use crate::traced::{Connection, ConnectionExt};
use crate::users::{self, NewUser};

/// What an `ensure_*` call did to its table.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The table was absent and has been created.
    Created,
    /// The table existed and these changes were applied, in order.
    Patched(Vec<Change>),
    /// The table existed and needed nothing.
    UpToDate,
}

impl Outcome {
    fn from_plan(plan: TablePlan) -> Self {
        if plan.creates_table() {
            Outcome::Created
        } else if plan.is_empty() {
            Outcome::UpToDate
        } else {
            Outcome::Patched(plan.changes)
        }
    }

    /// Whether any DDL was issued.
    pub fn changed(&self) -> bool {
        !matches!(self, Outcome::UpToDate)
    }
}

/// Runs schema operations against one configured database.
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: DbConfig,
}

impl Reconciler {
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub async fn ensure_users_table(&self) -> Result<Outcome, Error> {
        self.ensure_table(&tables::users()).await
    }

    pub async fn ensure_idr_master_table(&self) -> Result<Outcome, Error> {
        self.ensure_table(&tables::idr_master()).await
    }

    /// Create-only: an existing `scope` table is never altered.
    pub async fn ensure_scope_table(&self) -> Result<Outcome, Error> {
        self.ensure_table(&tables::scope()).await
    }

    pub async fn ensure_document_master_table(&self) -> Result<Outcome, Error> {
        self.ensure_table(&tables::document_master()).await
    }

    /// Reconcile every managed table in order, stopping at the first failure.
    pub async fn ensure_all(&self) -> Result<Vec<(String, Outcome)>, Error> {
        let mut outcomes = Vec::new();
        for table in tables::all_tables() {
            let outcome = self.ensure_table(&table).await?;
            outcomes.push((table.name, outcome));
        }
        Ok(outcomes)
    }

    /// Bring one table in line with its definition.
    pub async fn ensure_table(&self, table: &Table) -> Result<Outcome, Error> {
        let mut client = connect(&self.config).await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| Error::reconcile(&table.name, e))?;

        match apply(&tx, table).await {
            Ok(outcome) => {
                tx.commit()
                    .await
                    .map_err(|e| Error::reconcile(&table.name, e))?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(table = %table.name, error = %rollback_err, "rollback failed");
                }
                Err(Error::reconcile(&table.name, e))
            }
        }
    }

    /// Inspect every table and report what `ensure_all` would do, without writing.
    pub async fn plan_all(&self) -> Result<Vec<TablePlan>, Error> {
        let mut plans = Vec::new();
        for table in tables::all_tables() {
            let client = connect(&self.config).await?;
            let existing = catalog::inspect(&client, &table.name)
                .await
                .map_err(|e| Error::reconcile(&table.name, e))?;
            plans.push(plan_table(&table, existing.as_ref()));
        }
        Ok(plans)
    }

    /// Add a user, logging and swallowing anything but a connection failure.
    ///
    /// Returns `Ok(None)` when no row was inserted. Unlike the `ensure_*`
    /// operations, a rejected user is not fatal to the caller.
    pub async fn try_add_user(&self, user: &NewUser) -> Result<Option<i32>, Error> {
        match users::add_user(&self.config, user).await {
            Ok(created) => Ok(Some(created.id)),
            Err(e) if e.is_connection() => Err(e),
            Err(Error::Validation(e)) => {
                error!("Validation error: {}", e);
                Ok(None)
            }
            Err(e) => {
                error!("Error adding user: {}", e);
                Ok(None)
            }
        }
    }
}

async fn apply<C: Connection>(conn: &C, table: &Table) -> Result<Outcome, tokio_postgres::Error> {
    let existing = catalog::inspect(conn, &table.name).await?;
    if existing.is_some() {
        info!("Table '{}' already exists.", table.name);
    }

    let plan = plan_table(table, existing.as_ref());
    let traced = conn.traced();
    for change in &plan.changes {
        traced.execute(&change.to_sql(&table.name), &[]).await?;
        info!(table = %table.name, change = %change, "{}", change.summary(&table.name));
    }

    Ok(Outcome::from_plan(plan))
}
