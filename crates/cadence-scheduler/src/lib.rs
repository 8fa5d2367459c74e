//! Recurring delivery scheduler for Cadence.
//!
//! This crate provides the in-memory scheduler that:
//! - Runs one independent delivery worker per subscriber
//! - Keeps every delivery on the subscriber's phase grid (`created_at + n * period`)
//! - Survives restarts by rebuilding workers from persisted subscriptions
//! - Suppresses recently delivered content with a bounded dedup window
//! - Evicts subscribers whose deliveries keep failing

mod dedup;
mod delivery;
mod error;
mod scheduler;
mod store;
mod types;
mod worker;

pub use dedup::DedupWindow;
pub use delivery::{DeliveryCallback, DeliveryError};
pub use error::SchedulerError;
pub use scheduler::SchedulerCore;
pub use store::{MemoryStore, StoreError, SubscriptionStore};
pub use types::{SchedulerConfig, SubscriberId, Subscription};
