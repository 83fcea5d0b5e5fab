//! Daemon configuration from command-line flags and environment.

use crate::drive::DRIVE_API_BASE;
use chrono_tz::Tz;
use clap::Parser;
use drivewatch_core::MonitorConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "drivewatch")]
#[command(about = "Watch a Drive folder subtree and post changes to Slack")]
pub struct Args {
    /// Display label of the monitored root
    #[arg(long, env = "ROOT_NAME")]
    pub root_name: String,

    /// Id of the monitored root folder
    #[arg(long, env = "FOLDER_ID")]
    pub folder_id: String,

    /// Seconds to sleep between poll cycles
    #[arg(long, env = "POLL_SECONDS", default_value_t = 60)]
    pub poll_seconds: u64,

    /// IANA time zone for displayed times
    #[arg(long, env = "LOCAL_ZONE", default_value = "America/Toronto")]
    pub local_zone: String,

    /// Cursor state file
    #[arg(long, env = "STATE_FILE", default_value = "state.json")]
    pub state_file: PathBuf,

    /// Deployment target selecting the webhook (dev or prod)
    #[arg(long, env = "ENVIRONMENT", default_value = "prod")]
    pub environment: String,

    /// Webhook for the dev target
    #[arg(long, env = "SLACK_WEBHOOK_URL_DEV", hide_env_values = true)]
    pub slack_webhook_url_dev: Option<String>,

    /// Webhook for the prod target
    #[arg(long, env = "SLACK_WEBHOOK_URL_PROD", hide_env_values = true)]
    pub slack_webhook_url_prod: Option<String>,

    /// OAuth authorized-user token file
    #[arg(long, env = "TOKEN_FILE", default_value = "token.json")]
    pub token_file: PathBuf,

    /// Rebuild the path index on start even when resuming
    #[arg(long, env = "REBUILD_INDEX")]
    pub rebuild_index: bool,

    /// Drive REST base URL
    #[arg(long, env = "DRIVE_API_BASE", default_value = DRIVE_API_BASE)]
    pub drive_api_base: String,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown time zone: {0}")]
    InvalidZone(String),

    #[error("ENVIRONMENT must be dev or prod, got {0:?}")]
    InvalidEnvironment(String),

    #[error("{0} must not be empty")]
    Missing(&'static str),
}

/// Validated daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub root_name: String,
    pub folder_id: String,
    pub poll_interval: Duration,
    pub zone: Tz,
    pub state_file: PathBuf,
    pub environment: Environment,
    pub slack_webhook_url_dev: Option<String>,
    pub slack_webhook_url_prod: Option<String>,
    pub token_file: PathBuf,
    pub rebuild_index: bool,
    pub drive_api_base: String,
}

impl Config {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        if args.folder_id.trim().is_empty() {
            return Err(ConfigError::Missing("FOLDER_ID"));
        }
        if args.root_name.trim().is_empty() {
            return Err(ConfigError::Missing("ROOT_NAME"));
        }

        let zone = args
            .local_zone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidZone(args.local_zone.clone()))?;
        let environment = args.environment.parse()?;

        Ok(Self {
            root_name: args.root_name,
            folder_id: args.folder_id,
            poll_interval: Duration::from_secs(args.poll_seconds),
            zone,
            state_file: args.state_file,
            environment,
            slack_webhook_url_dev: non_empty(args.slack_webhook_url_dev),
            slack_webhook_url_prod: non_empty(args.slack_webhook_url_prod),
            token_file: args.token_file,
            rebuild_index: args.rebuild_index,
            drive_api_base: args.drive_api_base,
        })
    }

    /// Webhook for the selected deployment target, if configured.
    pub fn webhook_url(&self) -> Option<&str> {
        match self.environment {
            Environment::Dev => self.slack_webhook_url_dev.as_deref(),
            Environment::Prod => self.slack_webhook_url_prod.as_deref(),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        let mut config = MonitorConfig::new(&self.folder_id, &self.root_name, self.zone);
        config.poll_interval = self.poll_interval;
        config.rebuild_index = self.rebuild_index;
        config
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
