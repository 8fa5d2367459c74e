//! Cadence: a Telegram bot that sends images to subscribed chats on a
//! per-chat schedule.

pub mod commands;
pub mod config;
pub mod daemon;
pub mod delivery;
pub mod duration;
pub mod gallery;
pub mod handler;
pub mod transport;
