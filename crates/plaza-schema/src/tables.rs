//! The four portal tables.

use crate::schema::{Column, Patch, PgType, Table};

/// `NOW()` evaluated in portal-local time, stored without zone.
pub const LOCAL_NOW: &str = "(NOW() AT TIME ZONE 'Asia/Kolkata')";

/// Portal accounts.
pub fn users() -> Table {
    Table::new(
        "users",
        vec![
            Column::serial_pk("id"),
            Column::new("name", PgType::Varchar(255)).not_null(),
            Column::new("designation", PgType::Varchar(255)),
            Column::new("email_id", PgType::Varchar(255))
                .not_null()
                .unique(),
            Column::new("mob_no", PgType::Varchar(20)),
            Column::new("user_code", PgType::Varchar(50)),
            Column::new("role", PgType::Varchar(50)).not_null(),
            Column::new("temp_login", PgType::Boolean).default("TRUE"),
            Column::new("password", PgType::Varchar(255)).not_null(),
            Column::new("login_email_sent", PgType::Boolean).default("FALSE"),
            Column::new("created_at", PgType::Timestamp).default(LOCAL_NOW),
            plaza_name(),
        ],
    )
    .with_patches(vec![Patch::AddColumn(plaza_name())])
}

fn plaza_name() -> Column {
    Column::new("plaza_name", PgType::Varchar(255))
}

/// IDR (document request) headers, one row per request sent to a plaza.
///
/// Every column is nullable. `quarter` and `document_url` are legacy and get
/// dropped outright; `status` was renamed to `done`.
pub fn idr_master() -> Table {
    let email_sent = Column::new("email_sent", PgType::Varchar(50));
    let from_date = Column::new("from_date", PgType::Date);
    let to_date = Column::new("to_date", PgType::Date);
    let scope_name = Column::new("scope_name", PgType::Varchar(255));
    let done = Column::new("done", PgType::Varchar(50));
    let reminder = Column::new("reminder_email_datetime", PgType::Timestamp);
    let req_id = Column::new("req_id", PgType::Varchar(255));

    Table::new(
        "idr_master",
        vec![
            Column::serial_pk("id"),
            Column::new("plaza_name", PgType::Varchar(255)),
            Column::new("request_datetime", PgType::Timestamp),
            Column::new("due_date", PgType::Date),
            from_date.clone(),
            to_date.clone(),
            done.clone(),
            email_sent.clone(),
            scope_name.clone(),
            reminder.clone(),
            req_id.clone(),
        ],
    )
    .with_patches(vec![
        Patch::AddColumn(email_sent),
        Patch::DropColumn("quarter".to_string()),
        Patch::AddColumn(from_date),
        Patch::AddColumn(to_date),
        Patch::DropColumn("document_url".to_string()),
        Patch::AddColumn(scope_name),
        // Must run before the `done` check so a renamed column is not added twice.
        Patch::RenameColumn {
            from: "status".to_string(),
            to: "done".to_string(),
        },
        Patch::AddColumn(done),
        Patch::AddColumn(reminder),
        Patch::AddColumn(req_id),
    ])
}

/// Document scopes and the documents each one requires.
///
/// Create-only: this table has no patch path, an existing copy is left as is.
pub fn scope() -> Table {
    Table::new(
        "scope",
        vec![
            Column::serial_pk("id"),
            Column::new("scope_name", PgType::Varchar(255)),
            Column::new("required_documents", PgType::Varchar(255)),
        ],
    )
}

/// Uploaded documents attached to an IDR request.
pub fn document_master() -> Table {
    let columns = vec![
        Column::serial_pk("id"),
        Column::new("req_id", PgType::Varchar(255)),
        Column::new("document_type", PgType::Varchar(255)),
        Column::new("document_url", PgType::Varchar(255)),
        Column::new("modified_time", PgType::Timestamp),
        Column::new("year", PgType::Varchar(255)),
        Column::new("month", PgType::Varchar(255)),
        Column::new("is_rejected", PgType::Boolean).default("FALSE"),
        Column::new("reason", PgType::Varchar(255)),
    ];

    // Everything but the key is additive.
    let patches = columns
        .iter()
        .filter(|c| !c.primary_key)
        .cloned()
        .map(Patch::AddColumn)
        .collect();

    Table::new("document_master", columns).with_patches(patches)
}

/// All managed tables, in the order they are reconciled.
pub fn all_tables() -> Vec<Table> {
    vec![users(), idr_master(), scope(), document_master()]
}
