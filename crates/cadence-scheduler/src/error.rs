//! Error types for the scheduler.

use std::time::Duration;

use thiserror::Error;

use crate::{StoreError, SubscriberId};

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No live worker is registered for the subscriber.
    #[error("subscription not found: {0}")]
    NotFound(SubscriberId),

    /// Proposed period is outside the configured bounds.
    #[error("period {period:?} is outside the allowed range {min:?}..={max:?}")]
    InvalidPeriod {
        period: Duration,
        min: Duration,
        max: Duration,
    },

    /// Subscription store operation failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Invalid scheduler configuration.
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::NotFound(42);
        assert_eq!(err.to_string(), "subscription not found: 42");

        let err = SchedulerError::InvalidConfig("dedup_capacity must be at least 1".into());
        assert!(err.to_string().contains("dedup_capacity"));

        let err = SchedulerError::from(StoreError::new("disk full"));
        assert!(err.to_string().contains("persistence error"));
        assert!(err.to_string().contains("disk full"));
    }
}
