//! Change planning - compare a table definition against the live catalog.
//!
//! [`plan_table`] turns a [`Table`] and the column set introspected from the
//! database into the list of DDL changes that bring the table up to date.
//!
//! Patches are evaluated in order against a virtual copy of the column set,
//! and each planned change is applied to that copy before the next patch is
//! checked. This mirrors what a sequence of live catalog checks would see
//! inside one transaction, so for `idr_master`:
//!
//! ```text
//! columns: {status}        -> ~ rename status -> done
//! columns: {}              -> + done: VARCHAR(50) (nullable)
//! columns: {done}          -> (nothing)
//! ```

use std::fmt;

use crate::schema::{Column, ColumnSet, Patch, Table, quote_ident};

/// The changes needed for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    /// Table name.
    pub table: String,
    /// List of changes, in execution order.
    pub changes: Vec<Change>,
}

impl TablePlan {
    /// Returns true if the table is already up to date.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether this plan creates the table from scratch.
    pub fn creates_table(&self) -> bool {
        matches!(self.changes.first(), Some(Change::AddTable(_)))
    }

    /// Generate SQL statements for all changes in this plan.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for change in &self.changes {
            sql.push_str(&change.to_sql(&self.table));
            sql.push_str(";\n");
        }
        sql
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create the table with its full column list.
    AddTable(Table),
    /// Add a new column.
    AddColumn(Column),
    /// Drop an existing column.
    DropColumn(String),
    /// Rename a column.
    RenameColumn { from: String, to: String },
}

impl Change {
    /// Generate the SQL statement for this change, without trailing semicolon.
    pub fn to_sql(&self, table_name: &str) -> String {
        let table = quote_ident(table_name);
        match self {
            Change::AddTable(t) => t.create_table_sql(),
            Change::AddColumn(col) => format!("ALTER TABLE {} ADD COLUMN {}", table, col.to_sql()),
            Change::DropColumn(name) => {
                format!("ALTER TABLE {} DROP COLUMN {}", table, quote_ident(name))
            }
            Change::RenameColumn { from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table,
                quote_ident(from),
                quote_ident(to)
            ),
        }
    }

    /// Operator-facing progress line, logged once the change has been applied.
    pub fn summary(&self, table_name: &str) -> String {
        match self {
            Change::AddTable(_) => format!("Table '{}' created successfully!", table_name),
            Change::AddColumn(col) => {
                format!("Added column '{}' to {} table.", col.name, table_name)
            }
            Change::DropColumn(name) => {
                format!("Removed column '{}' from {} table.", name, table_name)
            }
            Change::RenameColumn { from, to } => format!(
                "Renamed column '{}' to '{}' in {} table.",
                from, to, table_name
            ),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.pg_type, nullable)
            }
            Change::DropColumn(name) => write!(f, "- {}", name),
            Change::RenameColumn { from, to } => write!(f, "~ rename {} -> {}", from, to),
        }
    }
}

/// Plan the changes for `table` given its current columns.
///
/// `existing` is `None` when the table does not exist at all.
pub fn plan_table(table: &Table, existing: Option<&ColumnSet>) -> TablePlan {
    let Some(existing) = existing else {
        return TablePlan {
            table: table.name.clone(),
            changes: vec![Change::AddTable(table.clone())],
        };
    };

    let mut columns = existing.clone();
    let mut changes = Vec::new();

    for patch in &table.patches {
        match patch {
            Patch::AddColumn(col) => {
                if !columns.contains(&col.name) {
                    columns.insert(col.name.clone());
                    changes.push(Change::AddColumn(col.clone()));
                }
            }
            Patch::DropColumn(name) => {
                if columns.remove(name) {
                    changes.push(Change::DropColumn(name.clone()));
                }
            }
            Patch::RenameColumn { from, to } => {
                // Both present is left to the database to reject; the
                // transaction then rolls back.
                if columns.remove(from) {
                    columns.insert(to.clone());
                    changes.push(Change::RenameColumn {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }
    }

    TablePlan {
        table: table.name.clone(),
        changes,
    }
}
