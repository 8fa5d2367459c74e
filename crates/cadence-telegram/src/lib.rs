//! Telegram access for Cadence, on top of `teloxide`.
//!
//! Builds the bot with Cadence's timeouts and API endpoint, sends photos and
//! documents either by cached file id or by upload, and reads back the file
//! id Telegram assigned to an upload.

mod bot;
mod error;

pub use bot::{DEFAULT_API_URL, MediaSource, POLL_TIMEOUT, TelegramBot, uploaded_file_id};
pub use error::TelegramError;
