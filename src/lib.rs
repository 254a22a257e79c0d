pub mod api;
pub mod auth;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod notifications;
pub mod otp;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::{LoginService, TokenIssuer};
use crate::catalog::{Catalog, CatalogRules};
use crate::notifications::NotificationDispatcher;
use crate::otp::OtpPolicy;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub rate_limiter: Arc<RateLimiter>,
    pub login: LoginService,
    pub catalog: Catalog,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, notifier: NotificationDispatcher) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let login = LoginService::new(
            db.clone(),
            OtpPolicy::from(&config.otp),
            TokenIssuer::new(&config.auth),
            notifier,
        );
        let catalog = Catalog::new(db.clone(), CatalogRules::from(&config.catalog));
        Self {
            config,
            db,
            rate_limiter,
            login,
            catalog,
        }
    }
}
