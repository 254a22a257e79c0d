//! Input validation for API requests and account provisioning.
//!
//! Validators return `Result<(), String>` with a human-readable message.
//! Handlers collect them with `ValidationErrorBuilder` from the `error` module.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

lazy_static! {
    /// Provisioned usernames: lowercase letters, digits and underscores
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[a-z0-9_]{3,25}$").unwrap();

    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$"
    ).unwrap();
}

const MIN_LOGIN_USERNAME: usize = 3;
const MAX_LOGIN_USERNAME: usize = 30;
const MIN_PASSWORD: usize = 8;

/// Validate the username submitted to the login endpoint
pub fn validate_login_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if len == 0 {
        return Err("Username is required".to_string());
    }
    if len < MIN_LOGIN_USERNAME {
        return Err(format!(
            "Username must be at least {} characters",
            MIN_LOGIN_USERNAME
        ));
    }
    if len > MAX_LOGIN_USERNAME {
        return Err(format!(
            "Username is too long (max {} characters)",
            MAX_LOGIN_USERNAME
        ));
    }
    Ok(())
}

/// Validate a password on login or provisioning
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.chars().count() < MIN_PASSWORD {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD
        ));
    }
    Ok(())
}

/// Validate a username for a new account
pub fn validate_new_username(username: &str) -> Result<(), String> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err("Username must be 3-25 lowercase letters, digits or underscores".to_string())
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

/// Validate a UUID format
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }
    Ok(())
}

/// Validate a submitted login code against the configured length
pub fn validate_otp_code(code: &str, length: usize) -> Result<(), String> {
    if code.is_empty() {
        return Err("Login code is required".to_string());
    }
    if code.chars().count() != length {
        return Err(format!("Login code must be {} characters", length));
    }
    Ok(())
}

/// Parse a price amount sent as a decimal string
pub fn parse_amount(raw: &str) -> Result<Decimal, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Amount is required".to_string());
    }
    Decimal::from_str(raw).map_err(|_| "Amount must be a decimal number".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_login_username() {
        assert!(validate_login_username("alice").is_ok());
        assert!(validate_login_username("").is_err());
        assert!(validate_login_username("al").is_err());
        assert!(validate_login_username(&"a".repeat(31)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("flat-white-42").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_validate_new_username() {
        assert!(validate_new_username("barista_01").is_ok());
        assert!(validate_new_username("Barista").is_err());
        assert!(validate_new_username("with space").is_err());
        assert!(validate_new_username(&"a".repeat(26)).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@vand.test").is_ok());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("not-an-email").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "otpId").is_ok());
        let err = validate_uuid("not-a-uuid", "otpId").unwrap_err();
        assert!(err.contains("otpId"));
    }

    #[test]
    fn test_validate_otp_code() {
        assert!(validate_otp_code("123456", 6).is_ok());
        assert!(validate_otp_code("", 6).is_err());
        assert!(validate_otp_code("12345", 6).is_err());
        assert!(validate_otp_code("1234567", 6).is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.50").unwrap(), Decimal::new(1250, 2));
        assert_eq!(parse_amount(" 3 ").unwrap(), Decimal::new(3, 0));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("twelve").is_err());
    }
}
