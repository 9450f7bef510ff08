//! Error types for the exchange-client crate.
//!
//! This module defines the errors that can occur when talking to the
//! exchange (network, authentication, API failures) and when keeping a live
//! orderbook in sync (sequence gaps, crossed books, malformed snapshots).
//!
//! Errors are split by whether retrying can help: see [`Error::is_fatal`] and
//! [`Error::is_transient`].

use rust_decimal::Decimal;
use thiserror::Error;

use crate::orderbook::BookError;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (bad endpoint, missing fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// API returned an error response
    #[error("API error ({}): {}", .0.status, .0.message)]
    Api(ApiError),

    /// Authentication failed (bad credentials, revoked session)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A call needing a session was made before buildup succeeded
    #[error("Not authenticated: no session token")]
    NotAuthenticated,

    /// Streaming connection closed unexpectedly
    #[error("Stream connection closed")]
    ConnectionClosed,

    /// Orderbook sequence gap detected (missed or duplicated messages)
    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// Expected sequence number
        expected: u64,
        /// Actual sequence number received
        got: u64,
    },

    /// Applying an update would have crossed the book
    #[error("Crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook {
        /// Best bid after the rejected update
        bid: Decimal,
        /// Best ask after the rejected update
        ask: Decimal,
    },

    /// The feed rejected the subscription for good (auth revoked, unknown market)
    #[error("Subscription rejected: {0}")]
    FatalSubscription(String),

    /// Bootstrap snapshot failed validation
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Ticker not present in the exchange's data
    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// The background sync task panicked or was aborted
    #[error("Sync task failed: {0}")]
    Internal(String),
}

/// Error returned by the exchange API
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Error message
    pub message: String,
}

impl Error {
    /// Errors that must not be retried: the engine stops and surfaces them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_)
                | Error::NotAuthenticated
                | Error::FatalSubscription(_)
                | Error::MalformedSnapshot(_)
                | Error::InvalidTicker(_)
                | Error::Config(_)
        ) || matches!(self, Error::Api(e) if e.is_client_error())
    }

    /// Errors that a reconnect with backoff can cure.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::WebSocket(_) | Error::ConnectionClosed | Error::Timeout => {
                true
            }
            Error::Api(e) => e.is_server_error(),
            _ => false,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {}", err))
    }
}

impl From<BookError> for Error {
    fn from(err: BookError) -> Self {
        match err {
            BookError::Gap { expected, got } => Error::SequenceGap { expected, got },
            BookError::Unsynced { got } => Error::SequenceGap { expected: 0, got },
            BookError::Crossed { bid, ask } => Error::CrossedBook { bid, ask },
        }
    }
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_api_error_display() {
        let err = Error::Api(ApiError::new(400, "Bad request"));
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("Bad request"));
    }

    #[test]
    fn test_sequence_gap() {
        let err = Error::SequenceGap {
            expected: 13,
            got: 14,
        };
        assert!(err.to_string().contains("13"));
        assert!(err.to_string().contains("14"));
    }

    #[test]
    fn test_book_error_conversion() {
        let err: Error = BookError::Crossed {
            bid: dec!(102),
            ask: dec!(101),
        }
        .into();
        assert!(matches!(err, Error::CrossedBook { .. }));
        assert!(err.to_string().contains("102"));
    }

    #[test]
    fn test_classification() {
        assert!(Error::ConnectionClosed.is_transient());
        assert!(!Error::ConnectionClosed.is_fatal());

        assert!(Error::FatalSubscription("revoked".into()).is_fatal());
        assert!(Error::MalformedSnapshot("crossed".into()).is_fatal());
        assert!(!Error::MalformedSnapshot("crossed".into()).is_transient());

        assert!(Error::Api(ApiError::new(503, "busy")).is_transient());
        assert!(Error::Api(ApiError::new(404, "nope")).is_fatal());
    }
}
