//! Pusher wire protocol: frame envelope, reserved event names and payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PusherError, Result};

/// Reserved protocol event names.
pub mod events {
    /// Client -> Server: subscribe to a channel.
    pub const SUBSCRIBE: &str = "pusher:subscribe";
    /// Client -> Server: unsubscribe from a channel.
    pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
    /// Server -> Client: socket established, carries the socket id.
    pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
    /// Server -> Client: protocol error.
    pub const ERROR: &str = "pusher:error";
    /// Keep-alive request.
    pub const PING: &str = "pusher:ping";
    /// Keep-alive response.
    pub const PONG: &str = "pusher:pong";
    /// Emitted on a channel once the server confirmed the subscription.
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher:subscription_succeeded";
    /// Emitted on a channel when its subscribe handshake failed locally.
    pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";
    /// Prefix of server events addressed to channel internals.
    pub const INTERNAL_PREFIX: &str = "pusher_internal:";
    /// Prefix channel listeners see in place of [`INTERNAL_PREFIX`].
    pub const PUBLIC_PREFIX: &str = "pusher:";
}

/// Connection-level event names broadcast by the connection emitter.
pub mod connection_events {
    /// A socket open attempt started.
    pub const CONNECTING: &str = "connecting";
    /// The server confirmed the connection.
    pub const CONNECTED: &str = "connected";
    /// The connection was closed by `disconnect()`.
    pub const DISCONNECTED: &str = "disconnected";
    /// A transport or protocol error occurred.
    pub const ERROR: &str = "error";
    /// Automatic reconnection gave up.
    pub const FAILED: &str = "failed";
}

/// Channel name prefix that requires authentication.
pub const PRIVATE_PREFIX: &str = "private-";
/// Channel name prefix for presence channels, which also require authentication.
pub const PRESENCE_PREFIX: &str = "presence-";

/// Error code used when a `pusher:error` frame has no usable code.
pub const DEFAULT_ERROR_CODE: u16 = 1;

/// Whether `channel` needs an auth signature to subscribe.
pub fn requires_auth(channel: &str) -> bool {
    channel.starts_with(PRIVATE_PREFIX) || channel.starts_with(PRESENCE_PREFIX)
}

/// Top-level frame envelope, used in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Payload. Often a JSON-encoded string on the inbound side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Target channel for channel-scoped events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Frame {
    /// Create a frame without a channel.
    pub fn new(event: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event: event.into(),
            data,
            channel: None,
        }
    }

    /// Address the frame to `channel`.
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize to the text sent over the socket.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Payload with JSON-encoded strings decoded.
    ///
    /// A string that is not valid JSON is returned unchanged.
    pub fn decoded_data(&self) -> Option<Value> {
        self.data.as_ref().map(decode_data)
    }

    /// Channel this frame addresses, from the envelope or the payload.
    pub fn target_channel(&self) -> Option<String> {
        if let Some(channel) = &self.channel {
            return Some(channel.clone());
        }
        self.decoded_data()
            .as_ref()
            .and_then(|data| data.get("channel"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Decode a payload that may be a JSON-encoded string.
pub fn decode_data(data: &Value) -> Value {
    match data {
        Value::String(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        other => other.clone(),
    }
}

/// Payload of `pusher:connection_established`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    /// Server-assigned socket id.
    pub socket_id: String,
    /// Seconds of inactivity after which the server expects a ping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_timeout: Option<u64>,
}

impl ConnectionEstablished {
    /// Extract the payload from a frame's data.
    pub fn from_data(data: Option<&Value>) -> Result<Self> {
        let data = data.ok_or_else(|| {
            PusherError::Json("connection_established frame without data".into())
        })?;
        Ok(serde_json::from_value(decode_data(data))?)
    }
}

/// Payload of `pusher:error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorData {
    /// Error code, [`DEFAULT_ERROR_CODE`] when missing or malformed.
    pub code: u16,
    /// Error message, if any.
    pub message: Option<String>,
}

impl ErrorData {
    /// Extract the error from a frame's data, tolerating missing fields.
    pub fn from_data(data: Option<&Value>) -> Self {
        let decoded = data.map(decode_data);
        let code = decoded
            .as_ref()
            .and_then(|d| d.get("code"))
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(DEFAULT_ERROR_CODE);
        let message = decoded
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { code, message }
    }

    /// Recovery the client applies for this error.
    pub fn action(&self) -> ErrorAction {
        match self.code {
            c if c >= 4200 => ErrorAction::ReconnectNow,
            c if c > 4100 => ErrorAction::ReconnectAfterDelay,
            _ => ErrorAction::Report,
        }
    }
}

impl From<ErrorData> for PusherError {
    fn from(err: ErrorData) -> Self {
        PusherError::Protocol {
            code: err.code,
            message: err.message,
        }
    }
}

/// Recovery applied to a `pusher:error` frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorAction {
    /// Codes >= 4200: reconnect immediately.
    ReconnectNow,
    /// Codes 4101-4199: reconnect after the protocol error delay.
    ReconnectAfterDelay,
    /// Codes <= 4100: broadcast only.
    Report,
}

/// Payload of `pusher:subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeData {
    /// Channel name.
    pub channel: String,
    /// Auth signature for private/presence channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Presence user info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

/// Body POSTed to the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Channel being subscribed.
    pub channel_name: String,
    /// Socket id of the current connection.
    pub socket_id: String,
}

/// Successful auth endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Signature to include in the subscribe frame.
    pub auth: String,
    /// Presence user info signed by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}
