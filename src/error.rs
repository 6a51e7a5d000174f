//! Error types for nzbio
//!
//! This module provides the error taxonomy for the streaming pipeline and its
//! HTTP surface:
//! - Domain-specific error types (manifest, article, yEnc, stream)
//! - Segment-level classification (which failures are worth another server)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for nzbio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nzbio
///
/// Pipeline failures are grouped into sub-enums so callers can match on the
/// stage that failed without string inspection.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "servers")
        key: Option<String>,
    },

    /// The NZB manifest could not be used
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// A single article could not be retrieved
    #[error("article error: {0}")]
    Article(#[from] ArticleError),

    /// A single article could not be decoded
    #[error("yEnc error: {0}")]
    Yenc(#[from] YencError),

    /// Stream-level failure (pool exhaustion, escalated segment, consumer gone)
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// Network error from an HTTP collaborator (NZB fetch, indexer, metadata)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request could not be understood (bad content id, missing parameter)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress - not accepting new streams
    #[error("shutdown in progress: not accepting new streams")]
    ShuttingDown,

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

/// Manifest-level errors: the NZB cannot produce a payload to stream
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not parseable or violates the NZB structure
    #[error("malformed manifest: {0}")]
    Malformed(String),

    /// The document exceeds one of the configured limits
    #[error("manifest too large: {what} is {actual}, limit is {limit}")]
    TooLarge {
        /// Which limit was exceeded ("document bytes", "segments per file")
        what: &'static str,
        /// Configured limit
        limit: usize,
        /// Observed value
        actual: usize,
    },

    /// No file in the manifest has any segments
    #[error("no payload file found in manifest")]
    NoPayloadFound,
}

/// Article retrieval errors raised by the segment fetcher
#[derive(Debug, Error)]
pub enum ArticleError {
    /// Server reported the article does not exist (permanent for that server)
    #[error("article {message_id} not found")]
    NotFound {
        /// Message ID that was requested
        message_id: String,
    },

    /// Transfer failed mid-exchange (connection reset, bad status, short read)
    #[error("transfer of article {message_id} failed: {reason}")]
    Transfer {
        /// Message ID that was requested
        message_id: String,
        /// Underlying failure
        reason: String,
    },

    /// The article did not arrive within the per-article timeout
    #[error("article {message_id} timed out after {timeout:?}")]
    Timeout {
        /// Message ID that was requested
        message_id: String,
        /// The timeout that elapsed
        timeout: Duration,
    },
}

impl ArticleError {
    /// Whether the session that produced this error can still be reused.
    ///
    /// A "no such article" reply completes the protocol exchange cleanly; a
    /// transfer failure or timeout leaves the connection in an unknown state.
    pub fn session_reusable(&self) -> bool {
        matches!(self, ArticleError::NotFound { .. })
    }
}

/// yEnc decoding errors
#[derive(Debug, Error)]
pub enum YencError {
    /// `=ybegin`/`=yend` missing or malformed, or a dangling escape
    #[error("invalid yEnc framing: {0}")]
    Frame(String),

    /// Decoded length disagrees with the trailer
    #[error("yEnc size mismatch: trailer declares {expected} bytes, decoded {actual}")]
    SizeMismatch {
        /// Size declared by `=yend size=`
        expected: u64,
        /// Number of bytes actually decoded
        actual: u64,
    },

    /// Decoded bytes do not match the trailer checksum
    #[error("yEnc checksum mismatch: expected {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch {
        /// CRC32 declared in the trailer
        expected: u32,
        /// CRC32 of the decoded bytes
        actual: u32,
    },
}

/// Stream-level errors raised by the pool and the assembler
#[derive(Debug, Error)]
pub enum StreamError {
    /// No configured server could provide a session
    #[error("no NNTP server available: {0}")]
    NoServerAvailable(String),

    /// A segment failed on every configured server
    #[error("segment {number} ({message_id}) unavailable after {attempts} attempt(s): {last_error}")]
    SegmentUnavailable {
        /// Sequence number of the segment
        number: u32,
        /// Message ID of the segment
        message_id: String,
        /// Number of servers tried
        attempts: usize,
        /// The last failure observed
        last_error: Box<Error>,
    },

    /// The consumer stopped reading (disconnect)
    #[error("stream consumer disconnected")]
    ConsumerGone,

    /// The consumer did not accept data within the write timeout
    #[error("stream consumer stalled for {0:?}")]
    ConsumerStalled(Duration),

    /// The overall request deadline elapsed
    #[error("stream exceeded overall timeout of {0:?}")]
    Timeout(Duration),

    /// The stream was cancelled by its owner
    #[error("stream cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is worth retrying the same segment on another server.
    ///
    /// Every article and yEnc failure qualifies: a missing article on one
    /// provider is commonly present on another, and decode failures usually
    /// mean one server delivered a damaged copy.
    pub fn is_segment_transient(&self) -> bool {
        matches!(self, Error::Article(_) | Error::Yenc(_))
    }

    /// Whether this error means the consumer went away rather than a server fault
    pub fn is_consumer_error(&self) -> bool {
        matches!(
            self,
            Error::Stream(
                StreamError::ConsumerGone | StreamError::ConsumerStalled(_) | StreamError::Cancelled
            )
        )
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "no_payload_found",
///     "message": "manifest error: no payload file found in manifest"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "malformed_manifest", "no_server_available")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Error::Config { .. } => 400,
            Error::InvalidRequest(_) => 400,

            // Manifest problems are the caller's input
            Error::Manifest(ManifestError::Malformed(_)) => 422,
            Error::Manifest(ManifestError::TooLarge { .. }) => 413,
            Error::Manifest(ManifestError::NoPayloadFound) => 404,
            Error::NotFound(_) => 404,

            // 502 Bad Gateway - upstream (NNTP or HTTP collaborator) misbehaved
            Error::Article(_) => 502,
            Error::Yenc(_) => 502,
            Error::Network(e) if e.is_timeout() => 504,
            Error::Network(_) => 502,
            Error::Stream(StreamError::SegmentUnavailable { .. }) => 502,

            // 503 Service Unavailable
            Error::Stream(StreamError::NoServerAvailable(_)) => 503,
            Error::ShuttingDown => 503,

            // 504 Gateway Timeout
            Error::Stream(StreamError::Timeout(_)) => 504,

            // Consumer-side conditions never reach a live response, but map them anyway
            Error::Stream(StreamError::ConsumerGone) => 499,
            Error::Stream(StreamError::ConsumerStalled(_)) => 499,
            Error::Stream(StreamError::Cancelled) => 499,

            // 500 Internal Server Error
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Manifest(e) => match e {
                ManifestError::Malformed(_) => "malformed_manifest",
                ManifestError::TooLarge { .. } => "manifest_too_large",
                ManifestError::NoPayloadFound => "no_payload_found",
            },
            Error::Article(e) => match e {
                ArticleError::NotFound { .. } => "article_not_found",
                ArticleError::Transfer { .. } => "article_transfer_error",
                ArticleError::Timeout { .. } => "article_timeout",
            },
            Error::Yenc(e) => match e {
                YencError::Frame(_) => "yenc_frame_error",
                YencError::SizeMismatch { .. } => "yenc_size_mismatch",
                YencError::ChecksumMismatch { .. } => "yenc_checksum_mismatch",
            },
            Error::Stream(e) => match e {
                StreamError::NoServerAvailable(_) => "no_server_available",
                StreamError::SegmentUnavailable { .. } => "segment_unavailable",
                StreamError::ConsumerGone => "consumer_gone",
                StreamError::ConsumerStalled(_) => "consumer_stalled",
                StreamError::Timeout(_) => "stream_timeout",
                StreamError::Cancelled => "cancelled",
            },
            Error::Network(_) => "network_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::NotFound(_) => "not_found",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::from(&error)
    }
}

impl From<&Error> for ApiError {
    fn from(error: &Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match error {
            Error::Manifest(ManifestError::TooLarge {
                what,
                limit,
                actual,
            }) => Some(serde_json::json!({
                "limit_kind": what,
                "limit": limit,
                "actual": actual,
            })),
            Error::Stream(StreamError::SegmentUnavailable {
                number,
                message_id,
                attempts,
                ..
            }) => Some(serde_json::json!({
                "segment": number,
                "message_id": message_id,
                "attempts": attempts,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        match details {
            Some(d) => ApiError::with_details(code, message, d),
            None => ApiError::new(code, message),
        }
    }
}
