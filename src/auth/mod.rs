//! Two-step login.
//!
//! Regular accounts get tokens as soon as their password checks out. Staff
//! accounts receive an emailed one-time code first and must submit it
//! against the returned challenge id. Spending the last attempt on a wrong
//! code bans the account until an administrator reactivates it.

mod password;
mod tokens;

pub use password::*;
pub use tokens::*;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Account, DbPool, LoginOtp};
use crate::notifications::{AlertLevel, NotificationDispatcher};
use crate::otp::{OtpChallenge, OtpError, OtpPolicy, Verdict};

/// Re-reads allowed when a concurrent submission bumps the attempt counter
const MAX_ATTEMPT_RETRIES: usize = 5;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no active account found with the given credentials")]
    InvalidCredentials,

    #[error("login challenge not found or no longer active")]
    InvalidChallenge,

    #[error("login code has expired")]
    ChallengeExpired,

    #[error("login code is incorrect")]
    IncorrectCode { remaining: i64 },

    #[error("account is locked")]
    AccountLocked,

    #[error("login challenge is busy, try again")]
    Contended,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of a correct username/password pair
#[derive(Debug)]
pub enum LoginOutcome {
    Tokens(TokenPair),
    OtpRequired { otp_id: String },
}

#[derive(Clone)]
pub struct LoginService {
    db: DbPool,
    policy: OtpPolicy,
    tokens: TokenIssuer,
    notifier: NotificationDispatcher,
}

impl LoginService {
    pub fn new(
        db: DbPool,
        policy: OtpPolicy,
        tokens: TokenIssuer,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            db,
            policy,
            tokens,
            notifier,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// First step. Unknown usernames, wrong passwords and inactive accounts
    /// all fail the same way.
    pub async fn submit_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let account = match Account::get_by_username(&self.db, username).await? {
            Some(account) => account,
            None => {
                verify_dummy(password);
                return Err(AuthError::InvalidCredentials);
            }
        };
        if !verify_password(password, &account.password_hash) || !account.is_active {
            info!(username = %username, "Rejected login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_staff {
            Account::touch_last_login(&self.db, &account.id).await?;
            let pair = self.tokens.issue_pair(&account)?;
            self.notifier.send_login_notice(&account);
            info!(username = %account.username, "Login succeeded");
            return Ok(LoginOutcome::Tokens(pair));
        }

        let (challenge, code) = OtpChallenge::issue(&self.policy, Utc::now())?;
        let mut tx = self.db.begin().await?;
        let otp = LoginOtp::create(&mut *tx, &account.id, challenge).await?;
        let admins = Account::active_superuser_emails(&mut *tx).await?;
        tx.commit().await?;

        self.notifier.send_otp_code(&account, &code);
        self.notifier.send_admin_alert(
            admins,
            AlertLevel::Info,
            "Login code requested for staff account",
            &account.username,
        );
        info!(
            username = %account.username,
            otp_id = %otp.challenge.id,
            "Login OTP issued"
        );

        Ok(LoginOutcome::OtpRequired {
            otp_id: otp.challenge.id,
        })
    }

    /// Second step for staff accounts.
    pub async fn submit_otp(&self, otp_id: &str, code: &str) -> Result<TokenPair, AuthError> {
        for _ in 0..MAX_ATTEMPT_RETRIES {
            let Some(mut otp) = LoginOtp::find_open(&self.db, otp_id).await? else {
                return Err(AuthError::InvalidChallenge);
            };

            let now = Utc::now();
            let seen_attempts = otp.challenge.attempts;
            let verdict = otp.challenge.evaluate(code, now);
            otp.challenge.apply(verdict, now);

            let mut tx = self.db.begin().await?;
            if !LoginOtp::record_attempt(&mut *tx, &otp, seen_attempts).await? {
                // Another submission for this challenge committed first
                continue;
            }

            return match verdict {
                Verdict::Exhausted => {
                    Account::ban(&mut *tx, &otp.account_id).await?;
                    let account = Account::get_by_id(&mut *tx, &otp.account_id).await?;
                    let admins = Account::active_superuser_emails(&mut *tx).await?;
                    tx.commit().await?;

                    let username = account.map(|a| a.username).unwrap_or_default();
                    warn!(username = %username, otp_id = %otp_id, "Account locked after failed login codes");
                    self.notifier.send_admin_alert(
                        admins,
                        AlertLevel::Warning,
                        "User has been banned for too many failed login attempts",
                        &username,
                    );
                    Err(AuthError::AccountLocked)
                }
                Verdict::Expired => {
                    tx.commit().await?;
                    Err(AuthError::ChallengeExpired)
                }
                Verdict::Incorrect { remaining } => {
                    tx.commit().await?;
                    Err(AuthError::IncorrectCode { remaining })
                }
                Verdict::Accepted => self.complete_login(tx, &otp).await,
            };
        }

        warn!(otp_id = %otp_id, "Gave up on contended login challenge");
        Err(AuthError::Contended)
    }

    async fn complete_login(
        &self,
        mut tx: sqlx::Transaction<'_, sqlx::Sqlite>,
        otp: &LoginOtp,
    ) -> Result<TokenPair, AuthError> {
        let account = match Account::get_by_id(&mut *tx, &otp.account_id).await? {
            Some(account) if account.is_active => account,
            _ => {
                // Banned through another challenge while this one was open
                tx.commit().await?;
                return Err(AuthError::AccountLocked);
            }
        };
        Account::touch_last_login(&mut *tx, &account.id).await?;
        let admins = Account::active_superuser_emails(&mut *tx).await?;
        tx.commit().await?;

        let pair = self.tokens.issue_pair(&account)?;
        self.notifier.send_login_notice(&account);
        self.notifier.send_admin_alert(
            admins,
            AlertLevel::Info,
            "Staff login verified",
            &account.username,
        );
        info!(username = %account.username, "Verified staff login");
        Ok(pair)
    }

    /// Exchange a refresh token for a new access token. The account must
    /// still exist and be active.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.tokens.validate(refresh_token, TokenType::Refresh)?;
        match Account::get_by_id(&self.db, &claims.sub).await? {
            Some(account) if account.is_active => Ok(self.tokens.issue_access(&account)?),
            _ => Err(AuthError::Token(TokenError::Invalid)),
        }
    }
}
