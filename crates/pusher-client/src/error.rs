//! Error types for the Pusher client.

use thiserror::Error;

/// Errors produced by the Pusher client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PusherError {
    /// The socket could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server sent a `pusher:error` frame.
    #[error("Protocol error {code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Protocol {
        /// Pusher error code (4000-4299 range for server errors).
        code: u16,
        /// Optional human-readable message from the server.
        message: Option<String>,
    },

    /// Channel authentication failed.
    #[error("Authentication error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Authentication {
        /// HTTP status of the auth endpoint response, if a request was made.
        status: Option<u16>,
        /// Failure reason, or the response body for HTTP failures.
        message: String,
    },

    /// Writing to the socket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid URL built from the options.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value in the auth configuration.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// HTTP transport error while talking to the auth endpoint.
    #[error("HTTP request error: {0}")]
    Http(String),

    /// Invalid configuration file contents.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A subscribe handshake was invalidated by a disconnect or reconnect.
    #[error("Operation cancelled by a disconnect or reconnect")]
    Cancelled,

    /// The client was created outside a tokio runtime.
    #[error("No tokio runtime available")]
    NoRuntime,
}

impl PusherError {
    /// Build an authentication error that never reached the auth endpoint.
    pub(crate) fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for PusherError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for PusherError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<url::ParseError> for PusherError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for PusherError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for PusherError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for PusherError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for Pusher client operations.
pub type Result<T> = std::result::Result<T, PusherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = PusherError::Protocol {
            code: 4001,
            message: Some("App does not exist".into()),
        };
        assert_eq!(err.to_string(), "Protocol error 4001: App does not exist");

        let err = PusherError::Protocol {
            code: 1,
            message: None,
        };
        assert_eq!(err.to_string(), "Protocol error 1");

        let err = PusherError::Authentication {
            status: Some(403),
            message: "forbidden".into(),
        };
        assert_eq!(err.to_string(), "Authentication error (HTTP 403): forbidden");

        let err = PusherError::auth("no socket id");
        assert_eq!(err.to_string(), "Authentication error: no socket id");
    }
}
