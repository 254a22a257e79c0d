//! Login OTP challenges.
//!
//! Attempt bookkeeping uses compare-and-swap on the `attempts` column so two
//! concurrent submissions against one challenge can never both be evaluated
//! against the same count.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};

use crate::db::timestamp;
use crate::otp::OtpChallenge;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LoginOtp {
    pub account_id: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub challenge: OtpChallenge,
}

const LOGIN_OTP_COLUMNS: &str = "id, account_id, code, attempts, max_attempts, is_active, is_verified, expires_at, created_at, last_attempted_at";

impl LoginOtp {
    pub async fn create<'e, E>(
        db: E,
        account_id: &str,
        challenge: OtpChallenge,
    ) -> Result<LoginOtp, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO login_otps (id, account_id, code, attempts, max_attempts, is_active, is_verified, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&challenge.id)
        .bind(account_id)
        .bind(&challenge.code)
        .bind(challenge.attempts)
        .bind(challenge.max_attempts)
        .bind(challenge.is_active)
        .bind(challenge.is_verified)
        .bind(timestamp(challenge.expires_at))
        .bind(timestamp(challenge.created_at))
        .execute(db)
        .await?;

        Ok(LoginOtp {
            account_id: account_id.to_string(),
            challenge,
        })
    }

    pub async fn get_by_id<'e, E>(db: E, id: &str) -> Result<Option<LoginOtp>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as(&format!(
            "SELECT {LOGIN_OTP_COLUMNS} FROM login_otps WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// A challenge that can still be answered: active and not yet verified.
    pub async fn find_open<'e, E>(db: E, id: &str) -> Result<Option<LoginOtp>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as(&format!(
            "SELECT {LOGIN_OTP_COLUMNS} FROM login_otps WHERE id = ? AND is_active = 1 AND is_verified = 0"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Persist the outcome of one verification attempt.
    ///
    /// Only succeeds while the stored row still has `expected_attempts` and is
    /// active. Returns false when another submission got there first.
    pub async fn record_attempt<'e, E>(
        db: E,
        otp: &LoginOtp,
        expected_attempts: i64,
    ) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let c = &otp.challenge;
        let result = sqlx::query(
            r#"
            UPDATE login_otps
            SET attempts = ?, is_active = ?, is_verified = ?, last_attempted_at = ?
            WHERE id = ? AND attempts = ? AND is_active = 1
            "#,
        )
        .bind(c.attempts)
        .bind(c.is_active)
        .bind(c.is_verified)
        .bind(c.last_attempted_at.map(timestamp))
        .bind(&c.id)
        .bind(expected_attempts)
        .execute(db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Deactivate unverified challenges past their deadline. Attempts and
    /// accounts are left alone.
    pub async fn sweep_expired<'e, E>(db: E, now: DateTime<Utc>) -> Result<u64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE login_otps SET is_active = 0 WHERE is_active = 1 AND is_verified = 0 AND expires_at < ?",
        )
        .bind(timestamp(now))
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_in_memory, Account, NewAccount};
    use crate::otp::{OtpPolicy, Verdict};
    use chrono::Duration;

    async fn seed_account(pool: &sqlx::SqlitePool) -> Account {
        Account::create(
            pool,
            &NewAccount {
                username: "alice".to_string(),
                email: Some("alice@vand.test".to_string()),
                password_hash: "hash".to_string(),
                is_staff: true,
                is_superuser: false,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_open() {
        let pool = init_in_memory().await.unwrap();
        let account = seed_account(&pool).await;
        let (challenge, _) = OtpChallenge::issue(&OtpPolicy::default(), Utc::now()).unwrap();

        let created = LoginOtp::create(&pool, &account.id, challenge).await.unwrap();
        let found = LoginOtp::find_open(&pool, &created.challenge.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.account_id, account.id);
        assert_eq!(found.challenge.code, created.challenge.code);
        assert_eq!(
            timestamp(found.challenge.expires_at),
            timestamp(created.challenge.expires_at)
        );
        assert!(found.challenge.is_active);
    }

    #[tokio::test]
    async fn test_stale_attempt_count_is_rejected() {
        let pool = init_in_memory().await.unwrap();
        let account = seed_account(&pool).await;
        let now = Utc::now();
        let (challenge, _) = OtpChallenge::issue(&OtpPolicy::default(), now).unwrap();
        let created = LoginOtp::create(&pool, &account.id, challenge).await.unwrap();

        let mut first = created.clone();
        first.challenge.apply(Verdict::Incorrect { remaining: 2 }, now);
        assert!(LoginOtp::record_attempt(&pool, &first, 0).await.unwrap());

        // Second writer still believes attempts == 0
        let mut second = created.clone();
        second.challenge.apply(Verdict::Incorrect { remaining: 2 }, now);
        assert!(!LoginOtp::record_attempt(&pool, &second, 0).await.unwrap());

        let stored = LoginOtp::get_by_id(&pool, &created.challenge.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.challenge.attempts, 1);
    }

    #[tokio::test]
    async fn test_verified_challenge_is_no_longer_open() {
        let pool = init_in_memory().await.unwrap();
        let account = seed_account(&pool).await;
        let now = Utc::now();
        let (challenge, code) = OtpChallenge::issue(&OtpPolicy::default(), now).unwrap();
        let mut otp = LoginOtp::create(&pool, &account.id, challenge).await.unwrap();

        let verdict = otp.challenge.evaluate(&code, now);
        otp.challenge.apply(verdict, now);
        assert!(LoginOtp::record_attempt(&pool, &otp, 0).await.unwrap());

        assert!(LoginOtp::find_open(&pool, &otp.challenge.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_sweep_only_touches_expired() {
        let pool = init_in_memory().await.unwrap();
        let account = seed_account(&pool).await;
        let now = Utc::now();
        let policy = OtpPolicy::default();

        let (old, _) = OtpChallenge::issue(&policy, now - Duration::minutes(10)).unwrap();
        let (fresh, _) = OtpChallenge::issue(&policy, now).unwrap();
        let old = LoginOtp::create(&pool, &account.id, old).await.unwrap();
        let fresh = LoginOtp::create(&pool, &account.id, fresh).await.unwrap();

        assert_eq!(LoginOtp::sweep_expired(&pool, now).await.unwrap(), 1);

        let old = LoginOtp::get_by_id(&pool, &old.challenge.id).await.unwrap().unwrap();
        assert!(!old.challenge.is_active);
        assert_eq!(old.challenge.attempts, 0);
        assert!(LoginOtp::find_open(&pool, &fresh.challenge.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_empty_code_rejected_by_schema() {
        let pool = init_in_memory().await.unwrap();
        let account = seed_account(&pool).await;
        let (mut challenge, _) = OtpChallenge::issue(&OtpPolicy::default(), Utc::now()).unwrap();
        challenge.code = String::new();

        assert!(LoginOtp::create(&pool, &account.id, challenge).await.is_err());
    }
}
