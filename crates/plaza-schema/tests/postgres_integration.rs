//! Integration tests against real PostgreSQL.
//!
//! These tests verify that:
//! 1. Fresh databases get all four tables, and re-runs are no-ops
//! 2. Older copies of the tables are patched in place
//! 3. add_user inserts, rejects duplicates, and rolls back on rejection
//! 4. Failures carry the server's own message
//!
//! Run with: cargo test -p plaza-schema --features test-postgres --test postgres_integration
//!
//! Note: Requires Docker to be running.

#![cfg(feature = "test-postgres")]

use chrono::NaiveDateTime;
use plaza_schema::catalog::{column_exists, inspect, table_columns};
use plaza_schema::{
    Change, DatabaseOutcome, DbConfig, DbType, Error, NewUser, Outcome, Reconciler, SslMode,
    connect, create_database, tables,
};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::ContainerAsync;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use tokio_postgres::Client;

/// Start a PostgreSQL container and return a config pointing at it.
async fn setup_postgres() -> (ContainerAsync<Postgres>, DbConfig) {
    let container = Postgres::default()
        .start()
        .await
        .expect("failed to start postgres container");
    let host = container
        .get_host()
        .await
        .expect("postgres host not available");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("postgres port not available");

    let config = DbConfig {
        host: host.to_string(),
        port,
        user: "postgres".to_string(),
        password: "postgres".to_string(),
        database: "postgres".to_string(),
        db_type: DbType::Postgres,
        ssl_mode: SslMode::Prefer,
    };
    (container, config)
}

async fn client(config: &DbConfig) -> Client {
    connect(config).await.expect("failed to connect")
}

async fn columns_of(config: &DbConfig, table: &str) -> Vec<String> {
    table_columns(&client(config).await, table)
        .await
        .unwrap()
        .into_iter()
        .collect()
}

async fn count_users(config: &DbConfig, email: &str) -> i64 {
    client(config)
        .await
        .query_one("SELECT COUNT(*) FROM users WHERE email_id = $1", &[&email])
        .await
        .unwrap()
        .get(0)
}

#[tokio::test]
async fn test_fresh_database_then_rerun_is_noop() {
    let (_container, config) = setup_postgres().await;
    let reconciler = Reconciler::new(config.clone());

    let first = reconciler.ensure_all().await.unwrap();
    assert_eq!(first.len(), 4);
    assert!(first.iter().all(|(_, o)| *o == Outcome::Created));

    let mut before = Vec::new();
    for table in tables::all_tables() {
        before.push(columns_of(&config, &table.name).await);
    }

    let second = reconciler.ensure_all().await.unwrap();
    assert!(second.iter().all(|(_, o)| *o == Outcome::UpToDate));

    for (table, columns) in tables::all_tables().iter().zip(before) {
        assert_eq!(columns_of(&config, &table.name).await, columns);
    }

    let mut actual = columns_of(&config, "users").await;
    let mut expected: Vec<String> = tables::users()
        .columns
        .iter()
        .map(|c| c.name.clone())
        .collect();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);

    let plans = reconciler.plan_all().await.unwrap();
    assert!(plans.iter().all(|p| p.is_empty()));
}

#[tokio::test]
async fn test_users_gains_plaza_name() {
    let (_container, config) = setup_postgres().await;
    client(&config)
        .await
        .batch_execute(
            "CREATE TABLE users (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                email_id VARCHAR(255) NOT NULL UNIQUE,
                role VARCHAR(50) NOT NULL,
                password VARCHAR(255) NOT NULL
            )",
        )
        .await
        .unwrap();

    let reconciler = Reconciler::new(config.clone());
    let outcome = reconciler.ensure_users_table().await.unwrap();
    assert!(matches!(outcome, Outcome::Patched(ref changes) if changes.len() == 1));

    let conn = client(&config).await;
    assert!(column_exists(&conn, "users", "plaza_name").await.unwrap());
    assert_eq!(
        reconciler.ensure_users_table().await.unwrap(),
        Outcome::UpToDate
    );
}

#[tokio::test]
async fn test_idr_master_status_renamed_to_done() {
    let (_container, config) = setup_postgres().await;
    client(&config)
        .await
        .batch_execute(
            "CREATE TABLE idr_master (
                id SERIAL PRIMARY KEY,
                plaza_name VARCHAR(255),
                request_datetime TIMESTAMP WITHOUT TIME ZONE,
                due_date DATE,
                status VARCHAR(50)
            );
            INSERT INTO idr_master (plaza_name, status) VALUES ('North', 'yes');",
        )
        .await
        .unwrap();

    let reconciler = Reconciler::new(config.clone());
    let outcome = reconciler.ensure_idr_master_table().await.unwrap();
    let Outcome::Patched(changes) = outcome else {
        panic!("expected a patch, got {:?}", outcome);
    };
    assert!(changes.contains(&Change::RenameColumn {
        from: "status".to_string(),
        to: "done".to_string(),
    }));
    assert!(
        !changes
            .iter()
            .any(|c| matches!(c, Change::AddColumn(col) if col.name == "done"))
    );

    let conn = client(&config).await;
    assert!(column_exists(&conn, "idr_master", "done").await.unwrap());
    assert!(!column_exists(&conn, "idr_master", "status").await.unwrap());

    // The rename keeps the data.
    let done: String = conn
        .query_one("SELECT done FROM idr_master WHERE plaza_name = 'North'", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(done, "yes");

    assert_eq!(
        reconciler.ensure_idr_master_table().await.unwrap(),
        Outcome::UpToDate
    );
}

#[tokio::test]
async fn test_idr_master_without_status_or_done_gets_done() {
    let (_container, config) = setup_postgres().await;
    client(&config)
        .await
        .batch_execute("CREATE TABLE idr_master (id SERIAL PRIMARY KEY, plaza_name VARCHAR(255))")
        .await
        .unwrap();

    let reconciler = Reconciler::new(config.clone());
    reconciler.ensure_idr_master_table().await.unwrap();

    let existing = inspect(&client(&config).await, "idr_master")
        .await
        .unwrap()
        .unwrap();
    for column in ["done", "email_sent", "from_date", "to_date", "scope_name", "req_id"] {
        assert!(existing.contains(column), "missing {}", column);
    }

    let nullable: String = client(&config)
        .await
        .query_one(
            "SELECT is_nullable::text FROM information_schema.columns \
             WHERE table_name = 'idr_master' AND column_name = 'done'",
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(nullable, "YES");
}

#[tokio::test]
async fn test_idr_master_legacy_columns_dropped() {
    let (_container, config) = setup_postgres().await;
    client(&config)
        .await
        .batch_execute(
            "CREATE TABLE idr_master (
                id SERIAL PRIMARY KEY,
                quarter VARCHAR(10),
                document_url VARCHAR(255),
                done VARCHAR(50)
            );
            INSERT INTO idr_master (quarter, document_url) VALUES ('Q1', 'https://files/1');",
        )
        .await
        .unwrap();

    Reconciler::new(config.clone())
        .ensure_idr_master_table()
        .await
        .unwrap();

    let conn = client(&config).await;
    assert!(!column_exists(&conn, "idr_master", "quarter").await.unwrap());
    assert!(!column_exists(&conn, "idr_master", "document_url").await.unwrap());
}

#[tokio::test]
async fn test_failed_patch_rolls_back_whole_table() {
    let (_container, config) = setup_postgres().await;
    // Both `status` and `done`: the rename fails on the duplicate column.
    client(&config)
        .await
        .batch_execute(
            "CREATE TABLE idr_master (
                id SERIAL PRIMARY KEY,
                quarter VARCHAR(10),
                status VARCHAR(50),
                done VARCHAR(50)
            )",
        )
        .await
        .unwrap();

    let err = Reconciler::new(config.clone())
        .ensure_idr_master_table()
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("idr_master"), "{}", message);
    assert!(message.contains("already exists"), "{}", message);

    let conn = client(&config).await;
    // Changes planned before the rename were rolled back too.
    assert!(column_exists(&conn, "idr_master", "quarter").await.unwrap());
    assert!(!column_exists(&conn, "idr_master", "email_sent").await.unwrap());
}

#[tokio::test]
async fn test_stale_scope_is_not_altered() {
    let (_container, config) = setup_postgres().await;
    client(&config)
        .await
        .batch_execute("CREATE TABLE scope (id SERIAL PRIMARY KEY)")
        .await
        .unwrap();

    let outcome = Reconciler::new(config.clone())
        .ensure_scope_table()
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::UpToDate);
    assert_eq!(columns_of(&config, "scope").await, ["id"]);
}

#[tokio::test]
async fn test_document_master_gains_columns() {
    let (_container, config) = setup_postgres().await;
    client(&config)
        .await
        .batch_execute("CREATE TABLE document_master (id SERIAL PRIMARY KEY, req_id VARCHAR(255))")
        .await
        .unwrap();

    let outcome = Reconciler::new(config.clone())
        .ensure_document_master_table()
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Patched(ref changes) if changes.len() == 7));

    let is_rejected: bool = {
        let conn = client(&config).await;
        conn.batch_execute("INSERT INTO document_master (req_id) VALUES ('R-1')")
            .await
            .unwrap();
        conn.query_one("SELECT is_rejected FROM document_master", &[])
            .await
            .unwrap()
            .get(0)
    };
    assert!(!is_rejected);
}

#[tokio::test]
async fn test_add_user() {
    let (_container, config) = setup_postgres().await;
    let reconciler = Reconciler::new(config.clone());
    reconciler.ensure_users_table().await.unwrap();

    let before: NaiveDateTime = client(&config)
        .await
        .query_one("SELECT (NOW() AT TIME ZONE 'Asia/Kolkata')", &[])
        .await
        .unwrap()
        .get(0);

    let created = plaza_schema::add_user(&config, &NewUser::new("Alice", "a@x.com", "pw", "admin"))
        .await
        .unwrap();
    assert!(created.id > 0);
    assert!(created.created_at >= before);

    let row = client(&config)
        .await
        .query_one(
            "SELECT temp_login, login_email_sent, password, created_at FROM users WHERE id = $1",
            &[&created.id],
        )
        .await
        .unwrap();
    let temp_login: bool = row.get("temp_login");
    let login_email_sent: bool = row.get("login_email_sent");
    let password: String = row.get("password");
    let created_at: NaiveDateTime = row.get("created_at");
    assert!(temp_login);
    assert!(!login_email_sent);
    assert_eq!(password, "pw");
    assert_eq!(created_at, created.created_at);
    assert_eq!(count_users(&config, "a@x.com").await, 1);
}

#[tokio::test]
async fn test_add_user_explicit_temp_login() {
    let (_container, config) = setup_postgres().await;
    let reconciler = Reconciler::new(config.clone());
    reconciler.ensure_users_table().await.unwrap();

    let user = NewUser {
        designation: Some("Manager".to_string()),
        temp_login: Some(false),
        ..NewUser::new("Bob", "b@x.com", "pw", "user")
    };
    let id = reconciler.try_add_user(&user).await.unwrap().unwrap();

    let row = client(&config)
        .await
        .query_one("SELECT temp_login, designation FROM users WHERE id = $1", &[&id])
        .await
        .unwrap();
    let temp_login: bool = row.get(0);
    let designation: Option<String> = row.get(1);
    assert!(!temp_login);
    assert_eq!(designation.as_deref(), Some("Manager"));
}

#[tokio::test]
async fn test_add_user_duplicate_email() {
    let (_container, config) = setup_postgres().await;
    let reconciler = Reconciler::new(config.clone());
    reconciler.ensure_users_table().await.unwrap();

    let user = NewUser::new("Alice", "a@x.com", "pw", "admin");
    assert!(reconciler.try_add_user(&user).await.unwrap().is_some());

    let again = NewUser::new("Alice Again", "a@x.com", "other", "admin");
    assert_eq!(reconciler.try_add_user(&again).await.unwrap(), None);
    assert_eq!(count_users(&config, "a@x.com").await, 1);
}

#[tokio::test]
async fn test_add_user_missing_fields() {
    let (_container, config) = setup_postgres().await;
    let reconciler = Reconciler::new(config.clone());
    reconciler.ensure_users_table().await.unwrap();

    for user in [
        NewUser::new("", "a@x.com", "pw", "admin"),
        NewUser::new("Alice", "", "pw", "admin"),
        NewUser::new("Alice", "a@x.com", "", "admin"),
        NewUser::new("Alice", "a@x.com", "pw", ""),
    ] {
        assert_eq!(reconciler.try_add_user(&user).await.unwrap(), None);
    }

    let total: i64 = client(&config)
        .await
        .query_one("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_create_database() {
    let (_container, mut config) = setup_postgres().await;
    config.database = "plaza_web".to_string();

    assert_eq!(
        create_database(&config).await.unwrap(),
        DatabaseOutcome::Created
    );
    assert_eq!(
        create_database(&config).await.unwrap(),
        DatabaseOutcome::AlreadyExists
    );

    let outcome = Reconciler::new(config).ensure_scope_table().await.unwrap();
    assert_eq!(outcome, Outcome::Created);
}

#[tokio::test]
async fn test_unreachable_database_is_a_connection_error() {
    let config = DbConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        user: "postgres".to_string(),
        password: String::new(),
        database: "plaza_web".to_string(),
        db_type: DbType::Postgres,
        ssl_mode: SslMode::Prefer,
    };

    let err = Reconciler::new(config.clone())
        .ensure_users_table()
        .await
        .unwrap_err();
    assert!(err.is_connection());
    let message = err.to_string();
    assert!(message.contains("error connecting to server"), "{}", message);
    assert_ne!(message, "Error connecting to database: db error");

    let result = Reconciler::new(config)
        .try_add_user(&NewUser::new("Alice", "a@x.com", "pw", "admin"))
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_ssl_mode_prefer_falls_back_and_require_refuses() {
    // The stock image runs without TLS.
    let (_container, mut config) = setup_postgres().await;

    assert_eq!(
        Reconciler::new(config.clone()).ensure_scope_table().await.unwrap(),
        Outcome::Created
    );

    config.ssl_mode = SslMode::Require;
    let err = Reconciler::new(config)
        .ensure_scope_table()
        .await
        .unwrap_err();
    assert!(err.is_connection());
    assert!(err.to_string().contains("TLS"), "{}", err);
}

#[tokio::test]
async fn test_add_user_with_unexpected_id_type_is_reported() {
    let (_container, config) = setup_postgres().await;
    let reconciler = Reconciler::new(config.clone());
    reconciler.ensure_users_table().await.unwrap();
    client(&config)
        .await
        .batch_execute("ALTER TABLE users ALTER COLUMN id TYPE BIGINT")
        .await
        .unwrap();

    let user = NewUser::new("Alice", "a@x.com", "pw", "admin");
    let err = plaza_schema::add_user(&config, &user).await.unwrap_err();
    assert!(matches!(err, Error::Postgres(_)), "{:?}", err);
    assert_eq!(reconciler.try_add_user(&user).await.unwrap(), None);

    // The insert was never committed.
    assert_eq!(count_users(&config, "a@x.com").await, 0);
}
