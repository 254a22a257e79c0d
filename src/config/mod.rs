use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_database_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/vand.db")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing access and refresh tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    #[serde(default = "default_refresh_token_hours")]
    pub refresh_token_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_minutes: default_access_token_minutes(),
            refresh_token_hours: default_refresh_token_hours(),
        }
    }
}

fn default_jwt_secret() -> String {
    "dev-secret-change-me".to_string()
}

fn default_access_token_minutes() -> i64 {
    15
}

fn default_refresh_token_hours() -> i64 {
    24
}

/// Login OTP policy.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Minutes a challenge stays valid after it is issued
    #[serde(default = "default_otp_expiry_minutes")]
    pub expiry_minutes: i64,
    /// Wrong submissions allowed before the account is locked
    #[serde(default = "default_otp_max_attempts")]
    pub max_attempts: i64,
    #[serde(default = "default_otp_code_length")]
    pub code_length: usize,
    /// Interval of the expired-challenge sweep (0 disables it)
    #[serde(default = "default_otp_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: default_otp_expiry_minutes(),
            max_attempts: default_otp_max_attempts(),
            code_length: default_otp_code_length(),
            sweep_interval_seconds: default_otp_sweep_interval(),
        }
    }
}

fn default_otp_expiry_minutes() -> i64 {
    5
}

fn default_otp_max_attempts() -> i64 {
    3
}

fn default_otp_code_length() -> usize {
    6
}

fn default_otp_sweep_interval() -> u64 {
    300
}

/// Outbound SMTP settings. Email is disabled unless host and sender are set.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Name used in subjects and message bodies
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: false,
            from_address: None,
            from_name: default_from_name(),
            site_name: default_site_name(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Cafe Vand".to_string()
}

fn default_site_name() -> String {
    "Cafe Vand".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_login_requests")]
    pub login_requests_per_window: u32,
    #[serde(default = "default_verify_login_requests")]
    pub verify_login_requests_per_window: u32,
    #[serde(default = "default_refresh_requests")]
    pub refresh_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between purges of stale client buckets
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_requests_per_window: default_api_requests(),
            login_requests_per_window: default_login_requests(),
            verify_login_requests_per_window: default_verify_login_requests(),
            refresh_requests_per_window: default_refresh_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_requests() -> u32 {
    20
}

fn default_login_requests() -> u32 {
    5
}

fn default_verify_login_requests() -> u32 {
    3
}

fn default_refresh_requests() -> u32 {
    10
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Largest accepted category icon, in megabytes
    #[serde(default = "default_icon_max_size_mb")]
    pub icon_max_size_mb: u64,
    #[serde(default = "default_allowed_icon_extensions")]
    pub allowed_icon_extensions: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            icon_max_size_mb: default_icon_max_size_mb(),
            allowed_icon_extensions: default_allowed_icon_extensions(),
        }
    }
}

fn default_icon_max_size_mb() -> u64 {
    1
}

fn default_allowed_icon_extensions() -> Vec<String> {
    vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    /// Reject settings the server must not start with.
    pub fn validate(&self) -> Result<()> {
        let secret = self.auth.jwt_secret.trim();
        if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret) {
            bail!("auth.jwt_secret is unset or still a placeholder");
        }
        if self.otp.max_attempts < 1 {
            bail!("otp.max_attempts must be at least 1");
        }
        if self.otp.expiry_minutes < 1 {
            bail!("otp.expiry_minutes must be at least 1");
        }
        if self.otp.code_length < 4 {
            bail!("otp.code_length must be at least 4");
        }
        Ok(())
    }
}
