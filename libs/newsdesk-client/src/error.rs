use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Structured validation errors returned by the backend alongside 4xx
/// responses, keyed by field name.
pub type ValidationErrors = HashMap<String, Vec<String>>;

/// API client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    /// Request building failed
    #[error("failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (failed to parse, or a path placeholder had no parameter)
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Single request attempt timed out
    #[error("request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (connect, DNS, reset, TLS handshake)
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS configuration error (client construction time)
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body exceeded the configured size limit
    #[error("response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status, with any structured validation payload the
    /// backend included in the body
    #[error("HTTP {status}: {message}")]
    Status {
        status: http::StatusCode,
        message: String,
        errors: Option<ValidationErrors>,
    },

    /// JSON serialization of a request body failed
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether this failure class is eligible for automatic retry.
    ///
    /// Only transport failures and per-attempt timeouts qualify. A response
    /// that was received and parsed (any status) is a definite result and is
    /// never retried at this layer.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Timeout(_))
    }

    /// Whether this is an authentication failure (HTTP 401).
    ///
    /// 403 is deliberately excluded: it means the authenticated principal
    /// lacks permission, and must not trigger a sign-out.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Status { status, .. } if *status == http::StatusCode::UNAUTHORIZED
        )
    }

    /// The HTTP status carried by this error, if a response was received.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<hyper::Error> for ApiError {
    fn from(err: hyper::Error) -> Self {
        ApiError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for ApiError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        ApiError::Transport(Box::new(err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Transport(Box::new(err))
    }
}
