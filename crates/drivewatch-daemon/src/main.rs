//! drivewatch: polls the Drive changes feed for one folder subtree and
//! posts a Slack message for every change inside it.

use anyhow::{Context, Result};
use clap::Parser;
use drivewatch_core::Poller;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drivewatch_daemon::{Args, Config, DriveClient, JsonFileStore, SlackNotifier, TokenManager};

/// Upper bound for a single HTTP exchange.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "info,drivewatch=debug,drivewatch_core=debug,drivewatch_daemon=debug"
    } else {
        "info,drivewatch=info,drivewatch_core=info,drivewatch_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_args(args).context("Invalid configuration")?;

    info!("Starting drivewatch");
    info!("Root: {} ({})", config.root_name, config.folder_id);
    info!("State file: {:?}", config.state_file);
    info!("Environment: {:?}", config.environment);

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let auth = TokenManager::load(&config.token_file, http.clone()).await?;
    let drive = DriveClient::new(http.clone(), &config.drive_api_base, auth);
    let store = JsonFileStore::new(&config.state_file);
    let slack = SlackNotifier::new(http, config.webhook_url().map(str::to_string));

    let mut poller = Poller::new(drive, store, slack, config.monitor_config());

    tokio::select! {
        result = poller.run() => {
            if let Err(e) = result {
                error!("Monitor stopped: {}", e);
                return Err(e).context("Monitoring failed");
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    info!("drivewatch stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
