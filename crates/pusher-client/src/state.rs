//! Connection state.

/// Current state of a [`Connection`](crate::Connection).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no connect attempt made yet.
    #[default]
    Initialized,
    /// Opening a socket or waiting for the server to confirm it.
    Connecting,
    /// The server confirmed the connection and assigned a socket id.
    Connected,
    /// Closed by `disconnect()`; no automatic reconnection.
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "initialized"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}
