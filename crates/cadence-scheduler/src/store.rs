//! Persistence boundary for subscription records.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{SubscriberId, Subscription};

/// A failed store operation, wrapping the backend's error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a backend error. `message` is context only; the cause is
    /// reachable through `source()`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Durable CRUD for subscription records.
///
/// `create` must upsert: at most one record exists per subscriber.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Subscription>, StoreError>;

    async fn create(&self, subscription: &Subscription) -> Result<(), StoreError>;

    async fn delete(&self, subscriber_id: SubscriberId) -> Result<(), StoreError>;
}

/// In-memory store, for tests and embedders without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<SubscriberId, Subscription>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = Subscription>) -> Self {
        let records = records
            .into_iter()
            .map(|s| (s.subscriber_id, s))
            .collect();
        Self {
            records: RwLock::new(records),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Look up a stored record directly.
    pub async fn get(&self, subscriber_id: SubscriberId) -> Option<Subscription> {
        self.records.read().await.get(&subscriber_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check(&self, op: &str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::new(format!("memory store: {op} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get_all(&self) -> Result<Vec<Subscription>, StoreError> {
        self.check("get_all")?;
        let mut subs: Vec<_> = self.records.read().await.values().cloned().collect();
        subs.sort_by_key(|s| s.subscriber_id);
        Ok(subs)
    }

    async fn create(&self, subscription: &Subscription) -> Result<(), StoreError> {
        self.check("create")?;
        self.records
            .write()
            .await
            .insert(subscription.subscriber_id, subscription.clone());
        Ok(())
    }

    async fn delete(&self, subscriber_id: SubscriberId) -> Result<(), StoreError> {
        self.check("delete")?;
        self.records.write().await.remove(&subscriber_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn test_with_source_does_not_repeat_cause() {
        let cause = std::io::Error::other("disk full");
        let err = StoreError::with_source("subscription store failed", cause);

        assert_eq!(err.to_string(), "subscription store failed");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_create_upserts() {
        let store = MemoryStore::new();
        let first = Subscription::new(1, Utc::now(), Duration::from_secs(900));
        let second = Subscription::new(1, Utc::now(), Duration::from_secs(1800));

        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(1).await, Some(second));
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryStore::new();
        store.set_failing(true);

        let sub = Subscription::new(1, Utc::now(), Duration::from_secs(900));
        assert!(store.create(&sub).await.is_err());
        assert!(store.get_all().await.is_err());
        assert!(store.delete(1).await.is_err());

        store.set_failing(false);
        assert!(store.create(&sub).await.is_ok());
    }

    #[test]
    fn test_store_error_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = StoreError::with_source("can not delete subscription", io);

        assert!(err.to_string().contains("can not delete subscription"));
        assert!(err.to_string().contains("disk gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
