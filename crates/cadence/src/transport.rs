//! Outbound chat operations the bot needs.

use async_trait::async_trait;

use cadence_telegram::{MediaSource, TelegramBot, TelegramError, uploaded_file_id};

/// How an image is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image, sent as a compressed photo.
    Photo,
    /// Gif, sent as a document so it keeps animating.
    Animation,
}

impl MediaKind {
    /// Media kind for an image file name, by extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" => Some(MediaKind::Photo),
            "gif" => Some(MediaKind::Animation),
            _ => None,
        }
    }
}

/// Sends replies and media to a chat.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;

    /// Send an image. Returns the file id the platform assigned to it, if any.
    async fn send_media(
        &self,
        chat_id: i64,
        kind: MediaKind,
        file: &MediaSource,
    ) -> Result<Option<String>, TelegramError>;
}

#[async_trait]
impl ChatTransport for TelegramBot {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        TelegramBot::send_text(self, chat_id, text).await.map(|_| ())
    }

    async fn send_media(
        &self,
        chat_id: i64,
        kind: MediaKind,
        file: &MediaSource,
    ) -> Result<Option<String>, TelegramError> {
        let message = match kind {
            MediaKind::Photo => self.send_photo(chat_id, file).await?,
            MediaKind::Animation => self.send_document(chat_id, file).await?,
        };
        Ok(uploaded_file_id(&message))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use teloxide::{ApiError, RequestError};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Text { chat_id: i64, text: String },
        Media { chat_id: i64, kind: MediaKind, file: MediaSource },
    }

    /// Records everything sent; media sends can be made to fail.
    #[derive(Default)]
    pub struct RecordingTransport {
        sent: Mutex<Vec<Sent>>,
        fail_media: AtomicBool,
        uploads: AtomicUsize,
    }

    impl RecordingTransport {
        pub fn set_fail_media(&self, fail: bool) {
            self.fail_media.store(fail, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self, chat_id: i64) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Text { chat_id: c, text } if c == chat_id => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn media(&self, chat_id: i64) -> Vec<(MediaKind, MediaSource)> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Media {
                        chat_id: c,
                        kind,
                        file,
                    } if c == chat_id => Some((kind, file)),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
            self.sent.lock().unwrap().push(Sent::Text {
                chat_id,
                text: text.to_string(),
            });
            Ok(())
        }

        async fn send_media(
            &self,
            chat_id: i64,
            kind: MediaKind,
            file: &MediaSource,
        ) -> Result<Option<String>, TelegramError> {
            if self.fail_media.load(Ordering::SeqCst) {
                return Err(TelegramError::Request(RequestError::Api(
                    ApiError::ChatNotFound,
                )));
            }
            self.sent.lock().unwrap().push(Sent::Media {
                chat_id,
                kind,
                file: file.clone(),
            });
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("tg-{}", n)))
        }
    }
}
