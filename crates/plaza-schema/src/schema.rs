//! Table definitions and DDL rendering.
//!
//! A [`Table`] holds the full column list used when the table is created from
//! scratch, plus an ordered list of [`Patch`]es applied when it already
//! exists. Column names, types and defaults here are the contract with the
//! rest of the portal and must not drift.

use std::collections::BTreeSet;
use std::fmt;

/// Column names currently present on a table, as seen in the catalog.
pub type ColumnSet = BTreeSet<String>;

/// Postgres column types used by the portal schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgType {
    /// SERIAL (auto-incrementing INTEGER)
    Serial,
    /// VARCHAR(n)
    Varchar(u16),
    /// BOOLEAN
    Boolean,
    /// DATE
    Date,
    /// TIMESTAMP WITHOUT TIME ZONE
    Timestamp,
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::Serial => write!(f, "SERIAL"),
            PgType::Varchar(len) => write!(f, "VARCHAR({})", len),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Date => write!(f, "DATE"),
            PgType::Timestamp => write!(f, "TIMESTAMP WITHOUT TIME ZONE"),
        }
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Postgres type
    pub pg_type: PgType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
    /// Whether this is the primary key
    pub primary_key: bool,
    /// Whether this has a unique constraint
    pub unique: bool,
}

impl Column {
    /// A nullable column with no default.
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
        }
    }

    /// `SERIAL PRIMARY KEY` column.
    pub fn serial_pk(name: impl Into<String>) -> Self {
        Self {
            primary_key: true,
            nullable: false,
            ..Self::new(name, PgType::Serial)
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Render the column definition as it appears in CREATE TABLE / ADD COLUMN.
    pub fn to_sql(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.pg_type);

        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            // PK columns are implicitly NOT NULL
            def.push_str(" NOT NULL");
        }

        if self.unique && !self.primary_key {
            def.push_str(" UNIQUE");
        }

        if let Some(default) = &self.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }

        def
    }
}

/// A reconciliation step applied to a table that already exists.
///
/// Each step is conditional on the current column set, which is what makes
/// repeated runs converge instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Add the column if it is missing.
    AddColumn(Column),
    /// Drop the column if it is present. Data in it is discarded.
    DropColumn(String),
    /// Rename `from` to `to` if `from` is present.
    RenameColumn { from: String, to: String },
}

/// A managed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Full column list for a fresh CREATE TABLE
    pub columns: Vec<Column>,
    /// Steps that bring an older copy of the table up to date, in order
    pub patches: Vec<Patch>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            patches: Vec::new(),
        }
    }

    pub fn with_patches(mut self, patches: Vec<Patch>) -> Self {
        self.patches = patches;
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Generate the CREATE TABLE statement.
    pub fn create_table_sql(&self) -> String {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("    {}", col.to_sql()))
            .collect();

        format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_ident(&self.name),
            parts.join(",\n")
        )
    }
}

/// Quote a Postgres identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' {
            quoted.push_str("\"\"");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('"');
    quoted
}
