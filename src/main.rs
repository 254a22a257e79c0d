use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vand::api::rate_limit::spawn_cleanup_task;
use vand::cli::{run_command, Cli};
use vand::config::Config;
use vand::engine::spawn_otp_sweep_task;
use vand::notifications::{mailer_from_config, NotificationDispatcher, Notices};
use vand::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !cli.is_serve() {
        return run_command(&cli, &config).await;
    }

    config.validate()?;
    tracing::info!("Starting Vand v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = vand::db::init(&config.server.database_path).await?;

    // Outbound mail
    let mailer = mailer_from_config(&config.email);
    let notifier =
        NotificationDispatcher::start(mailer, Notices::new(config.email.site_name.clone()));

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), db.clone(), notifier));

    // Background maintenance
    spawn_otp_sweep_task(db.clone(), &config.otp);
    spawn_cleanup_task(
        state.rate_limiter.clone(),
        config.rate_limit.cleanup_interval,
    );

    let app = vand::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
