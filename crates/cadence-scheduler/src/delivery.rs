//! The injected delivery capability.

use async_trait::async_trait;
use thiserror::Error;

use crate::{DedupWindow, SubscriberId};

/// A failed delivery attempt.
///
/// Never surfaced to scheduler callers; it only feeds the worker's
/// failure counter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Selects and sends one content item to a subscriber.
///
/// Implementations should consult `recent` and avoid re-sending one of its
/// identifiers when alternatives exist. On success they return the
/// identifier of the delivered item, which the worker records in its window.
#[async_trait]
pub trait DeliveryCallback: Send + Sync {
    async fn deliver(
        &self,
        subscriber_id: SubscriberId,
        recent: &DedupWindow,
    ) -> Result<String, DeliveryError>;
}
