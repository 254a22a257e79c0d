//! One-time passcode engine.
//!
//! Codes are short numeric strings mailed to the account owner. Only the
//! SHA-256 digest is ever stored; verification hashes the submitted code and
//! compares digests in constant time. Everything here is pure: persistence
//! and the account lockout live in the login flow.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::OtpConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OtpError {
    #[error("OTP code cannot be empty")]
    EmptyCode,
}

/// Expiry window, attempt budget and code length for issued challenges.
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub expiry: Duration,
    pub max_attempts: i64,
    pub code_length: usize,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::from(&OtpConfig::default())
    }
}

impl From<&OtpConfig> for OtpPolicy {
    fn from(config: &OtpConfig) -> Self {
        Self {
            expiry: Duration::minutes(config.expiry_minutes),
            max_attempts: config.max_attempts,
            code_length: config.code_length,
        }
    }
}

/// Generate a numeric code, each digit sampled uniformly from 0-9.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Hex-encoded SHA-256 digest of a code
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fields shared by every challenge kind. Concrete challenges (login today)
/// embed this and add their owner reference.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OtpChallenge {
    pub id: String,
    /// SHA-256 hex digest, never the plaintext
    #[serde(skip_serializing)]
    pub code: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub is_active: bool,
    pub is_verified: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_attempted_at: Option<DateTime<Utc>>,
}

/// Outcome of checking a submitted code against a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Attempt budget is spent; the owner must be locked out
    Exhausted,
    Expired,
    Incorrect { remaining: i64 },
    Accepted,
}

impl OtpChallenge {
    /// Build a challenge around an already hashed code.
    pub fn new(hashed_code: String, policy: &OtpPolicy, now: DateTime<Utc>) -> Result<Self, OtpError> {
        if hashed_code.trim().is_empty() {
            return Err(OtpError::EmptyCode);
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            code: hashed_code,
            attempts: 0,
            max_attempts: policy.max_attempts,
            is_active: true,
            is_verified: false,
            expires_at: now + policy.expiry,
            created_at: now,
            last_attempted_at: None,
        })
    }

    /// Generate a fresh code and the challenge that guards it.
    /// Returns the plaintext code for delivery; it is not kept anywhere else.
    pub fn issue(policy: &OtpPolicy, now: DateTime<Utc>) -> Result<(Self, String), OtpError> {
        let code = generate_code(policy.code_length);
        let challenge = Self::new(hash_code(&code), policy, now)?;
        Ok((challenge, code))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn verify(&self, submitted: &str) -> bool {
        let digest = hash_code(submitted);
        let expected = self.code.as_bytes();
        let provided = digest.as_bytes();
        expected.len() == provided.len() && expected.ct_eq(provided).into()
    }

    /// Check order is fixed: exhausted, then expired, then the code itself.
    /// A wrong code that spends the last attempt counts as exhausted.
    pub fn evaluate(&self, submitted: &str, now: DateTime<Utc>) -> Verdict {
        if !self.has_attempts_left() {
            return Verdict::Exhausted;
        }
        if self.is_expired(now) {
            return Verdict::Expired;
        }
        if !self.verify(submitted) {
            let remaining = self.max_attempts - (self.attempts + 1);
            if remaining <= 0 {
                return Verdict::Exhausted;
            }
            return Verdict::Incorrect { remaining };
        }
        Verdict::Accepted
    }

    /// Apply the state change a verdict implies.
    pub fn apply(&mut self, verdict: Verdict, now: DateTime<Utc>) {
        self.last_attempted_at = Some(now);
        match verdict {
            Verdict::Exhausted | Verdict::Expired => {
                self.attempts = (self.attempts + 1).min(self.max_attempts);
                self.is_active = false;
            }
            Verdict::Incorrect { .. } => {
                self.attempts += 1;
            }
            Verdict::Accepted => {
                self.is_verified = true;
                self.is_active = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> OtpPolicy {
        OtpPolicy {
            expiry: Duration::minutes(5),
            max_attempts: 3,
            code_length: 6,
        }
    }

    #[test]
    fn test_generate_code_is_numeric_and_sized() {
        for length in [4, 6, 8] {
            let code = generate_code(length);
            assert_eq!(code.len(), length);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_is_deterministic_sha256_hex() {
        let a = hash_code("123456");
        let b = hash_code("123456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(
            a,
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
        assert_ne!(a, hash_code("123457"));
    }

    #[test]
    fn test_empty_hash_rejected() {
        let err = OtpChallenge::new(String::new(), &policy(), Utc::now()).unwrap_err();
        assert_eq!(err, OtpError::EmptyCode);
    }

    #[test]
    fn test_issue_stores_only_the_digest() {
        let now = Utc::now();
        let (challenge, code) = OtpChallenge::issue(&policy(), now).unwrap();

        assert_ne!(challenge.code, code);
        assert_eq!(challenge.code, hash_code(&code));
        assert!(challenge.verify(&code));
        assert!(challenge.is_active);
        assert!(!challenge.is_verified);
        assert_eq!(challenge.attempts, 0);
        assert_eq!(challenge.expires_at, now + Duration::minutes(5));
    }

    #[test]
    fn test_expiry_is_strictly_after_deadline() {
        let now = Utc::now();
        let (challenge, _) = OtpChallenge::issue(&policy(), now).unwrap();
        assert!(!challenge.is_expired(challenge.expires_at));
        assert!(challenge.is_expired(challenge.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_wrong_codes_until_exhausted() {
        let now = Utc::now();
        let (mut challenge, code) = OtpChallenge::issue(&policy(), now).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let first = challenge.evaluate(wrong, now);
        assert_eq!(first, Verdict::Incorrect { remaining: 2 });
        challenge.apply(first, now);

        let second = challenge.evaluate(wrong, now);
        assert_eq!(second, Verdict::Incorrect { remaining: 1 });
        challenge.apply(second, now);

        let third = challenge.evaluate(wrong, now);
        assert_eq!(third, Verdict::Exhausted);
        challenge.apply(third, now);

        assert_eq!(challenge.attempts, 3);
        assert!(!challenge.is_active);
        assert!(!challenge.is_verified);
    }

    #[test]
    fn test_exhausted_wins_over_expired() {
        let now = Utc::now();
        let (mut challenge, code) = OtpChallenge::issue(&policy(), now).unwrap();
        challenge.attempts = challenge.max_attempts;
        let later = now + Duration::minutes(10);

        assert_eq!(challenge.evaluate(&code, later), Verdict::Exhausted);
        challenge.apply(Verdict::Exhausted, later);
        assert_eq!(challenge.attempts, challenge.max_attempts);
    }

    #[test]
    fn test_expired_wins_over_correct_code() {
        let now = Utc::now();
        let (mut challenge, code) = OtpChallenge::issue(&policy(), now).unwrap();
        let later = now + Duration::minutes(6);

        let verdict = challenge.evaluate(&code, later);
        assert_eq!(verdict, Verdict::Expired);
        challenge.apply(verdict, later);
        assert_eq!(challenge.attempts, 1);
        assert!(!challenge.is_active);
    }

    #[test]
    fn test_accept_marks_verified_and_inactive() {
        let now = Utc::now();
        let (mut challenge, code) = OtpChallenge::issue(&policy(), now).unwrap();

        let verdict = challenge.evaluate(&code, now);
        assert_eq!(verdict, Verdict::Accepted);
        challenge.apply(verdict, now);
        assert!(challenge.is_verified);
        assert!(!challenge.is_active);
        assert_eq!(challenge.attempts, 0);
        assert_eq!(challenge.last_attempted_at, Some(now));
    }

    #[test]
    fn test_policy_from_config() {
        let config = OtpConfig {
            expiry_minutes: 2,
            max_attempts: 5,
            code_length: 8,
            sweep_interval_seconds: 0,
        };
        let policy = OtpPolicy::from(&config);
        assert_eq!(policy.expiry, Duration::minutes(2));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.code_length, 8);
    }
}
