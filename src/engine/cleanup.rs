//! Login challenge cleanup
//!
//! Expired challenges are already refused at verification time. This task
//! only flips their `is_active` flag so the table does not accumulate open
//! rows. Attempt counters and accounts are never touched.

use crate::config::OtpConfig;
use crate::db::LoginOtp;
use crate::DbPool;
use anyhow::Result;
use chrono::Utc;
use tokio::time::{interval, Duration};

/// Deactivates expired login challenges
pub struct OtpSweeper {
    db: DbPool,
}

impl OtpSweeper {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run a single sweep
    pub async fn run_sweep(&self) -> Result<SweepStats> {
        let deactivated = LoginOtp::sweep_expired(&self.db, Utc::now()).await?;
        if deactivated > 0 {
            tracing::info!(deactivated = deactivated, "Deactivated expired login challenges");
        } else {
            tracing::debug!("No expired login challenges");
        }
        Ok(SweepStats { deactivated })
    }
}

/// Statistics from a sweep
#[derive(Debug, Default)]
pub struct SweepStats {
    pub deactivated: u64,
}

/// Spawn the background sweep task
pub fn spawn_otp_sweep_task(db: DbPool, config: &OtpConfig) {
    let interval_secs = config.sweep_interval_seconds;
    if interval_secs == 0 {
        tracing::info!("Login challenge sweep is disabled");
        return;
    }

    tracing::info!(interval_secs = interval_secs, "Starting login challenge sweep task");

    let sweeper = OtpSweeper::new(db);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = sweeper.run_sweep().await {
                tracing::error!(error = %e, "Login challenge sweep failed");
            }
        }
    });
}
