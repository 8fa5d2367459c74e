//! Chat command parsing and subscription period validation.

use std::time::Duration;

use thiserror::Error;

use cadence_scheduler::SchedulerConfig;

use crate::duration::{format_short, parse_duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Peepo,
    Subscribe,
    Unsubscribe,
    SubscriptionInfo,
    Help,
    Unknown,
}

impl Command {
    fn from_name(name: &str) -> Self {
        match name {
            "start" => Command::Start,
            "peepo" => Command::Peepo,
            "sub" => Command::Subscribe,
            "unsub" => Command::Unsubscribe,
            "sub_info" => Command::SubscriptionInfo,
            "help" => Command::Help,
            _ => Command::Unknown,
        }
    }
}

/// A command together with the text following it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    pub args: String,
}

impl Invocation {
    /// Parse message text. Returns `None` unless it starts with `/`.
    ///
    /// A `@botname` suffix on the command is dropped.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.trim_start().strip_prefix('/')?;
        let (head, args) = match body.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (body, ""),
        };
        if head.is_empty() {
            return None;
        }
        let name = head.split_once('@').map_or(head, |(name, _)| name);

        Some(Self {
            command: Command::from_name(name),
            args: args.to_string(),
        })
    }
}

/// Rejected subscription period, worded for the chat.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a period in format like \"1h30m25s\"! (min: {min}, max: {max})")]
    Unparsable { min: String, max: String },

    #[error("Subscription period must be between {min} and {max}!")]
    OutOfBounds { min: String, max: String },
}

/// Parse and bounds-check a requested period. The result is truncated to
/// whole seconds.
pub fn validate_period(input: &str, config: &SchedulerConfig) -> Result<Duration, ValidationError> {
    let min = format_short(config.min_period);
    let max = format_short(config.max_period);

    let period = parse_duration(input).map_err(|_| ValidationError::Unparsable {
        min: min.clone(),
        max: max.clone(),
    })?;

    if config.validate_period(period).is_err() {
        return Err(ValidationError::OutOfBounds { min, max });
    }

    Ok(Duration::from_secs(period.as_secs()))
}

pub const WELCOME_TEXT: &str = "Welcome to peepobot. Now you can use any available command.";

pub const HELP_TEXT: &str = "Command list help:\n\
    /peepo - Get random peepo picture;\n\
    /sub <period> - Subscribe to receive peepo pictures. Example: \"/sub 1h30m20s\";\n\
    /sub_info - Get info about current subscription;\n\
    /unsub - Unsubscribe from receiving peepo pictures;\n\
    /help - Get this list.";
