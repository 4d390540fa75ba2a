//! Haggle - real-time property inquiry negotiation
//!
//! This library provides the negotiation core of a property marketplace: a
//! buyer (client) and a property owner negotiate a price over a persistent
//! connection, then hand off into a purchase request/confirm step. The server
//! keeps the authoritative inquiry state machine; clients reconnect with
//! bounded backoff and reconcile through HTTP fallback endpoints.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod client;
pub mod dispatch;
pub mod hub;
pub mod negotiation;
pub mod outbox;
pub mod protocol;
pub mod registry;
pub mod storage;
pub mod transport;
pub mod typing;

use negotiation::NegotiationError;
use protocol::{ErrorCode, ValidationError};
use storage::{InquiryId, PropertyId};

/// Result type alias for Haggle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Haggle operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Inbound envelope failed codec validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Negotiation guard rule rejected the action
    #[error("{0}")]
    Negotiation(#[from] NegotiationError),

    /// No identity could be established from the presented credential
    #[error("Unauthorized")]
    Unauthorized,

    /// Caller's role does not permit the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Referenced property does not exist in the catalog
    #[error("Property {0} not found")]
    PropertyNotFound(PropertyId),

    /// Property exists but cannot be inquired about
    #[error("Property {0} is not available: {1}")]
    PropertyUnavailable(PropertyId, String),

    /// An open inquiry already exists for this client and property
    #[error("An open inquiry already exists for property {0}")]
    DuplicateInquiry(PropertyId),

    /// Optimistic version check failed on commit
    #[error("Inquiry {0} was modified concurrently")]
    Conflict(InquiryId),

    /// Per-inquiry lock could not be acquired in time
    #[error("Inquiry {0} is busy, try again")]
    Busy(InquiryId),

    /// Live channel is not connected
    #[error("Not connected")]
    NotConnected,

    /// Connection attempt exceeded the configured timeout
    #[error("Connection attempt timed out")]
    ConnectionTimeout,

    /// Non-success response from the HTTP fallback API
    #[error("API error {status} ({code}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Machine-readable error code
        code: String,
        /// Human-readable message
        message: String,
    },

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Storage operation error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Notification outbox error
    #[error("Outbox error: {0}")]
    Outbox(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// CBOR serialization error
    #[error("CBOR serialization error: {0}")]
    CborSerialization(String),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP/Hyper error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// WebSocket framing error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP client error
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl Error {
    /// Wire error code reported to the sender of a failed action
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::Validation,
            Error::Negotiation(e) => e.code(),
            Error::Unauthorized => ErrorCode::Unauthorized,
            Error::Forbidden(_) => ErrorCode::Forbidden,
            Error::PropertyNotFound(_) => ErrorCode::NotFound,
            Error::PropertyUnavailable(..) => ErrorCode::InvalidTransition,
            Error::DuplicateInquiry(_) | Error::Conflict(_) => ErrorCode::Conflict,
            Error::Busy(_) => ErrorCode::Busy,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the error was caused by the caller rather than the server
    pub fn is_client_error(&self) -> bool {
        !matches!(self.code(), ErrorCode::Internal | ErrorCode::Busy)
    }
}

/// Initialize logging for binaries and integration harnesses
///
/// Honors `RUST_LOG`; defaults to `haggle=info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("haggle=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests;
