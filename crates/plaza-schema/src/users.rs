//! Adding portal users.
//!
//! Passwords are stored exactly as given. The portal backend compares them
//! verbatim, so hashing here would lock every new account out; it is a known
//! gap in the portal, not something to copy elsewhere.

use chrono::NaiveDateTime;
use tracing::info;

use crate::config::DbConfig;
use crate::connect::connect;
use crate::error::{Error, ValidationError};
use crate::traced::ConnectionExt;

const FIND_BY_EMAIL_SQL: &str = "SELECT id FROM users WHERE email_id = $1";

const INSERT_SQL: &str = r#"INSERT INTO users (name, designation, email_id, mob_no, user_code, role, password, created_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, (NOW() AT TIME ZONE 'Asia/Kolkata'))
RETURNING id, created_at"#;

const INSERT_WITH_TEMP_LOGIN_SQL: &str = r#"INSERT INTO users (name, designation, email_id, mob_no, user_code, role, password, created_at, temp_login)
VALUES ($1, $2, $3, $4, $5, $6, $7, (NOW() AT TIME ZONE 'Asia/Kolkata'), $8)
RETURNING id, created_at"#;

/// A user to insert into `users`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email_id: String,
    pub password: String,
    pub role: String,
    pub designation: Option<String>,
    pub mob_no: Option<String>,
    pub user_code: Option<String>,
    /// Left to the column default (`TRUE`) when unset.
    pub temp_login: Option<bool>,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email_id: impl Into<String>,
        password: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email_id: email_id.into(),
            password: password.into(),
            role: role.into(),
            ..Default::default()
        }
    }

    /// Check the required fields are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("name", &self.name),
            ("email_id", &self.email_id),
            ("password", &self.password),
            ("role", &self.role),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// The row created by [`add_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedUser {
    pub id: i32,
    /// Portal-local wall-clock time of the insert.
    pub created_at: NaiveDateTime,
}

/// Insert a user, rejecting missing fields and duplicate emails.
///
/// Nothing is written unless the whole operation succeeds.
pub async fn add_user(config: &DbConfig, user: &NewUser) -> Result<CreatedUser, Error> {
    user.validate()?;

    let mut client = connect(config).await?;
    let tx = client.transaction().await?;
    let conn = tx.traced();

    if conn
        .query_opt(FIND_BY_EMAIL_SQL, &[&user.email_id])
        .await?
        .is_some()
    {
        // Dropping the transaction rolls it back.
        return Err(ValidationError::DuplicateEmail(user.email_id.clone()).into());
    }

    let row = match user.temp_login {
        None => {
            conn.query_one(
                INSERT_SQL,
                &[
                    &user.name,
                    &user.designation,
                    &user.email_id,
                    &user.mob_no,
                    &user.user_code,
                    &user.role,
                    &user.password,
                ],
            )
            .await?
        }
        Some(temp_login) => {
            conn.query_one(
                INSERT_WITH_TEMP_LOGIN_SQL,
                &[
                    &user.name,
                    &user.designation,
                    &user.email_id,
                    &user.mob_no,
                    &user.user_code,
                    &user.role,
                    &user.password,
                    &temp_login,
                ],
            )
            .await?
        }
    };

    // An older `users` table may carry other column types.
    let created = CreatedUser {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
    };
    tx.commit().await?;

    info!("User '{}' (ID: {}) added successfully!", user.name, created.id);
    Ok(created)
}
