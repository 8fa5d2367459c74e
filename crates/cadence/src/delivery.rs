//! Sending gallery images, on demand and from subscription workers.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use cadence_scheduler::{DedupWindow, DeliveryCallback, DeliveryError, SubscriberId};
use cadence_telegram::{MediaSource, TelegramError};

use crate::gallery::{Gallery, GalleryItem};
use crate::transport::{ChatTransport, MediaKind};

#[derive(Debug, Error)]
pub enum SendImageError {
    #[error("gallery is empty")]
    EmptyGallery,

    #[error("unsupported image format: {0}")]
    Unsupported(String),

    #[error("failed to send {name}: {source}")]
    Send {
        name: String,
        #[source]
        source: TelegramError,
    },
}

/// Picks gallery images and sends them to chats.
pub struct ImageDelivery {
    gallery: Arc<Gallery>,
    transport: Arc<dyn ChatTransport>,
}

impl ImageDelivery {
    pub fn new(gallery: Arc<Gallery>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { gallery, transport }
    }

    /// Send one random image right away. Returns the image name.
    pub async fn send_random(&self, chat_id: i64) -> Result<String, SendImageError> {
        let item = self.gallery.pick().await.ok_or(SendImageError::EmptyGallery)?;
        self.send_item(chat_id, item).await
    }

    /// Send `item`, reusing its cached file id when there is one.
    ///
    /// After a fresh upload the assigned file id is cached. Failing to cache
    /// it does not fail the send.
    async fn send_item(&self, chat_id: i64, item: GalleryItem) -> Result<String, SendImageError> {
        let kind = MediaKind::from_file_name(&item.name)
            .ok_or_else(|| SendImageError::Unsupported(item.name.clone()))?;

        let file = match &item.file_id {
            Some(id) => MediaSource::FileId(id.clone()),
            None => MediaSource::Path(self.gallery.path_of(&item.name)),
        };

        let uploaded = self
            .transport
            .send_media(chat_id, kind, &file)
            .await
            .map_err(|source| SendImageError::Send {
                name: item.name.clone(),
                source,
            })?;

        if item.file_id.is_none() {
            match uploaded {
                Some(file_id) => {
                    if let Err(e) = self.gallery.remember_file_id(&item.name, &file_id).await {
                        warn!(name = %item.name, error = %e, "failed to cache file id");
                    }
                }
                None => warn!(name = %item.name, "no file id in send response"),
            }
        }

        debug!(chat_id, name = %item.name, "image sent");
        Ok(item.name)
    }
}

#[async_trait]
impl DeliveryCallback for ImageDelivery {
    async fn deliver(
        &self,
        subscriber_id: SubscriberId,
        recent: &DedupWindow,
    ) -> Result<String, DeliveryError> {
        let item = self
            .gallery
            .pick_excluding(recent)
            .await
            .ok_or_else(|| DeliveryError::new(SendImageError::EmptyGallery.to_string()))?;

        self.send_item(subscriber_id, item)
            .await
            .map_err(|e| DeliveryError::new(e.to_string()))
    }
}
