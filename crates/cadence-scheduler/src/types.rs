//! Scheduler types.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Opaque identifier of a subscriber (a chat id).
pub type SubscriberId = i64;

/// Default number of consecutive failures before a subscriber is evicted.
const DEFAULT_MAX_FAILURES: u32 = 3;

/// Default dedup window capacity.
const DEFAULT_DEDUP_CAPACITY: usize = 10;

/// Default minimum subscription period (15 minutes).
const DEFAULT_MIN_PERIOD: Duration = Duration::from_secs(15 * 60);

/// Default maximum subscription period (24 hours).
const DEFAULT_MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay before the first delivery of a freshly created subscription.
const DEFAULT_CREATE_DELAY: Duration = Duration::from_secs(1);

/// A recurring delivery subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Who receives the deliveries.
    pub subscriber_id: SubscriberId,
    /// Phase origin of the recurrence.
    pub created_at: DateTime<Utc>,
    /// Recurrence interval.
    #[serde(with = "period_secs")]
    pub period: Duration,
}

impl Subscription {
    /// Create a new subscription with the given phase origin.
    pub fn new(subscriber_id: SubscriberId, created_at: DateTime<Utc>, period: Duration) -> Self {
        Self {
            subscriber_id,
            created_at,
            period,
        }
    }

    /// Next boundary on the phase grid strictly after `now`.
    ///
    /// Boundaries are `created_at + n * period`; restarts never shift them.
    pub fn next_delivery_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period_ms = i64::try_from(self.period.as_millis())
            .unwrap_or(i64::MAX)
            .max(1);
        let elapsed_ms = (now - self.created_at).num_milliseconds();
        let passed = elapsed_ms.div_euclid(period_ms);

        self.created_at + TimeDelta::milliseconds(passed.saturating_add(1).saturating_mul(period_ms))
    }

    /// How long to wait from `now` until the next phase-grid boundary.
    pub fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_delivery_at(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Scheduler tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Consecutive delivery failures that trigger eviction.
    pub max_failures: u32,
    /// Capacity of each worker's dedup window.
    pub dedup_capacity: usize,
    /// Shortest allowed subscription period.
    pub min_period: Duration,
    /// Longest allowed subscription period.
    pub max_period: Duration,
    /// Delay before the first delivery after `create`.
    pub create_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            min_period: DEFAULT_MIN_PERIOD,
            max_period: DEFAULT_MAX_PERIOD,
            create_delay: DEFAULT_CREATE_DELAY,
        }
    }
}

impl SchedulerConfig {
    /// Check the configuration for values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_failures == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_failures must be at least 1".to_string(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(SchedulerError::InvalidConfig(
                "dedup_capacity must be at least 1".to_string(),
            ));
        }
        if self.min_period.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "min_period must be positive".to_string(),
            ));
        }
        if self.min_period > self.max_period {
            return Err(SchedulerError::InvalidConfig(format!(
                "min_period ({:?}) exceeds max_period ({:?})",
                self.min_period, self.max_period
            )));
        }
        Ok(())
    }

    /// Check a proposed subscription period against the configured bounds.
    pub fn validate_period(&self, period: Duration) -> Result<(), SchedulerError> {
        if period < self.min_period || period > self.max_period {
            return Err(SchedulerError::InvalidPeriod {
                period,
                min: self.min_period,
                max: self.max_period,
            });
        }
        Ok(())
    }
}

/// Serialize a period as whole seconds.
mod period_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(period: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(period.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
