//! SQLite persistence for Cadence.
//!
//! Stores subscription records (the scheduler's durable state) and the
//! cache of Telegram file ids for already-uploaded images.

mod db;
mod error;

pub use db::SqliteStore;
pub use error::DbError;
