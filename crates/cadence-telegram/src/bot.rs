//! Bot construction and the send calls Cadence makes.

use std::path::PathBuf;
use std::time::Duration;

use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, Me, Message};
use tracing::debug;

use crate::TelegramError;

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// How long a `getUpdates` long poll may wait for new updates.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// An image to send: either already on Telegram's servers or a local upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    FileId(String),
    Path(PathBuf),
}

impl MediaSource {
    fn to_input_file(&self) -> InputFile {
        match self {
            MediaSource::FileId(id) => InputFile::file_id(id.clone()),
            MediaSource::Path(path) => InputFile::file(path.clone()),
        }
    }
}

/// A teloxide [`Bot`] with Cadence's endpoint and timeouts.
#[derive(Clone)]
pub struct TelegramBot {
    bot: Bot,
    request_timeout: Duration,
}

impl TelegramBot {
    /// Build the bot. Sends are bounded by `request_timeout`; the HTTP client
    /// itself allows [`POLL_TIMEOUT`] on top so long polls can complete.
    pub fn new(
        api_url: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, TelegramError> {
        let url = url::Url::parse(api_url).map_err(|e| TelegramError::InvalidApiUrl {
            url: api_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = teloxide::net::default_reqwest_settings()
            .timeout(request_timeout + POLL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TelegramError::Client(e.to_string()))?;

        Ok(Self {
            bot: Bot::with_client(token, client).set_api_url(url),
            request_timeout,
        })
    }

    /// The underlying bot, for building the update listener.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Identify the bot account behind the token.
    pub async fn get_me(&self) -> Result<Me, TelegramError> {
        self.bounded(self.bot.get_me()).await
    }

    /// Send a plain text message.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> Result<Message, TelegramError> {
        self.bounded(self.bot.send_message(ChatId(chat_id), text))
            .await
    }

    /// Send an image as a compressed photo.
    pub async fn send_photo(
        &self,
        chat_id: i64,
        photo: &MediaSource,
    ) -> Result<Message, TelegramError> {
        log_upload("photo", photo);
        self.bounded(self.bot.send_photo(ChatId(chat_id), photo.to_input_file()))
            .await
    }

    /// Send a file as a document. Gifs are shown as animations.
    pub async fn send_document(
        &self,
        chat_id: i64,
        document: &MediaSource,
    ) -> Result<Message, TelegramError> {
        log_upload("document", document);
        self.bounded(
            self.bot
                .send_document(ChatId(chat_id), document.to_input_file()),
        )
        .await
    }

    async fn bounded<T, R>(&self, request: R) -> Result<T, TelegramError>
    where
        R: IntoFuture<Output = Result<T, RequestError>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| TelegramError::Timeout(self.request_timeout))?
            .map_err(TelegramError::from)
    }
}

fn log_upload(kind: &str, source: &MediaSource) {
    if let MediaSource::Path(path) = source {
        debug!(kind, path = %path.display(), "uploading file");
    }
}

/// File id Telegram assigned to the media a sent message carries.
///
/// Photos come back in several sizes; the largest by pixel area wins. Gifs
/// sent as documents come back as animations, so those are checked before
/// plain documents.
pub fn uploaded_file_id(message: &Message) -> Option<String> {
    if let Some(sizes) = message.photo() {
        return sizes
            .iter()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
            .map(|p| p.file.id.to_string());
    }
    message
        .animation()
        .map(|a| a.file.id.to_string())
        .or_else(|| message.document().map(|d| d.file.id.to_string()))
}
