//! Runtime configuration for the bot.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use cadence_scheduler::{SchedulerConfig, SchedulerError};
use cadence_telegram::DEFAULT_API_URL;

use crate::duration::parse_duration;

/// Options for `cadence run`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Telegram bot token
    #[arg(long, env = "CADENCE_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// SQLite database path
    #[arg(long, env = "CADENCE_DB_PATH")]
    pub db_path: PathBuf,

    /// Directory with the images to send
    #[arg(long, env = "CADENCE_IMAGES_DIR")]
    pub images_dir: PathBuf,

    /// Bot API base URL
    #[arg(long, env = "CADENCE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Minimum time between commands from one chat
    #[arg(long, env = "CADENCE_COMMAND_COOLDOWN", default_value = "5s", value_parser = parse_duration)]
    pub command_cooldown: Duration,

    /// Timeout for Bot API requests
    #[arg(long, env = "CADENCE_REQUEST_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Recently sent images remembered per subscription
    #[arg(long, env = "CADENCE_DEDUP_CAPACITY", default_value = "10")]
    pub dedup_capacity: usize,

    /// Consecutive failed deliveries before a subscription is dropped
    #[arg(long, env = "CADENCE_MAX_FAILURES", default_value = "3")]
    pub max_failures: u32,

    /// Shortest allowed subscription period
    #[arg(long, env = "CADENCE_MIN_PERIOD", default_value = "15m", value_parser = parse_duration)]
    pub min_period: Duration,

    /// Longest allowed subscription period
    #[arg(long, env = "CADENCE_MAX_PERIOD", default_value = "24h", value_parser = parse_duration)]
    pub max_period: Duration,
}

/// Validated configuration for the daemon.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub db_path: PathBuf,
    pub images_dir: PathBuf,
    pub api_url: String,
    pub command_cooldown: Duration,
    pub request_timeout: Duration,
    pub scheduler: SchedulerConfig,
}

impl TryFrom<RunArgs> for BotConfig {
    type Error = SchedulerError;

    fn try_from(args: RunArgs) -> Result<Self, Self::Error> {
        let scheduler = SchedulerConfig {
            max_failures: args.max_failures,
            dedup_capacity: args.dedup_capacity,
            min_period: whole_seconds(args.min_period),
            max_period: whole_seconds(args.max_period),
            ..SchedulerConfig::default()
        };
        scheduler.validate()?;

        Ok(Self {
            bot_token: args.bot_token,
            db_path: args.db_path,
            images_dir: args.images_dir,
            api_url: args.api_url,
            command_cooldown: args.command_cooldown,
            request_timeout: args.request_timeout,
            scheduler,
        })
    }
}

fn whole_seconds(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}
