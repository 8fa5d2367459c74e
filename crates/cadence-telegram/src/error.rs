//! Error types for the Telegram layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the Bot API.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The request reached teloxide and failed there (network, API, JSON).
    #[error(transparent)]
    Request(#[from] teloxide::RequestError),

    /// A send did not finish within the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("invalid API URL {url}: {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use teloxide::{ApiError, RequestError};

    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelegramError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "request timed out after 5s");

        let err = TelegramError::InvalidApiUrl {
            url: "not a url".into(),
            reason: "relative URL without a base".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid API URL not a url: relative URL without a base"
        );
    }

    #[test]
    fn test_request_error_is_transparent() {
        let inner = RequestError::Api(ApiError::BotBlocked);
        let expected = inner.to_string();

        let err = TelegramError::from(inner);
        assert_eq!(err.to_string(), expected);
        assert!(matches!(
            err,
            TelegramError::Request(RequestError::Api(ApiError::BotBlocked))
        ));
    }
}
