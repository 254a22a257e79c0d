//! Account model.
//!
//! Accounts are provisioned out-of-band; the login flow only stamps
//! `last_login_at` and, on an OTP lockout, clears the active and staff flags.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    /// Staff accounts must pass an emailed OTP before tokens are issued
    pub is_staff: bool,
    /// Superusers receive admin security alerts
    pub is_superuser: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields required to provision an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, is_active, is_staff, is_superuser, last_login_at, created_at, updated_at";

impl Account {
    pub async fn create<'e, E>(db: E, new: &NewAccount) -> Result<Account, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now();

        sqlx::query_as(&format!(
            r#"
            INSERT INTO accounts (id, username, email, password_hash, is_active, is_staff, is_superuser, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.is_staff)
        .bind(new.is_superuser)
        .bind(&now)
        .bind(&now)
        .fetch_one(db)
        .await
    }

    pub async fn get_by_id<'e, E>(db: E, id: &str) -> Result<Option<Account>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn get_by_username<'e, E>(db: E, username: &str) -> Result<Option<Account>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(db)
        .await
    }

    /// Record a completed login
    pub async fn touch_last_login<'e, E>(db: E, id: &str) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let now = crate::db::now();
        sqlx::query("UPDATE accounts SET last_login_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Deactivate the account and revoke its staff flag.
    pub async fn ban<'e, E>(db: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE accounts SET is_active = 0, is_staff = 0, updated_at = ? WHERE id = ?",
        )
        .bind(crate::db::now())
        .bind(id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Manual admin reactivation after a lockout. Only inactive accounts are
    /// touched; staff access comes back only when `restore_staff` is set.
    pub async fn reactivate<'e, E>(
        db: E,
        username: &str,
        restore_staff: bool,
    ) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET is_active = 1, is_staff = (is_staff OR ?), updated_at = ?
            WHERE username = ? AND is_active = 0
            "#,
        )
        .bind(restore_staff)
        .bind(crate::db::now())
        .bind(username)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Email addresses of every active superuser
    pub async fn active_superuser_emails<'e, E>(db: E) -> Result<Vec<String>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT email FROM accounts
            WHERE is_superuser = 1 AND is_active = 1 AND email IS NOT NULL AND email != ''
            ORDER BY username
            "#,
        )
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }
}
