//! Client for the Pusher real-time messaging protocol.
//!
//! This crate connects to a Pusher-compatible service over a persistent
//! WebSocket and provides:
//!
//! - **Channels**: public, `private-` and `presence-` channels with
//!   per-channel event listeners
//! - **Authentication**: private and presence subscriptions are signed by
//!   your auth endpoint over HTTP
//! - **Resubscription**: every registered channel is subscribed again after
//!   each reconnect
//! - **Recovery**: exponential backoff on connect failures and automatic
//!   reconnects for the protocol's reconnect-class error codes
//!
//! # Example
//!
//! ```ignore
//! use pusher_client::{listener, Pusher, PusherOptions};
//!
//! let pusher = Pusher::new("app-key", PusherOptions::new().cluster("eu"))?;
//!
//! pusher.bind("connected", &listener(|data| {
//!     println!("connected: {data:?}");
//! }));
//!
//! let channel = pusher.subscribe("my-channel", None).await?;
//! channel.bind("my-event", &listener(|data| {
//!     println!("my-event: {data:?}");
//! }));
//! ```
//!
//! # Connection Events
//!
//! Listeners bound on [`Pusher`] or [`Connection`] receive raw protocol
//! events by name as well as `connecting`, `connected`, `disconnected`,
//! `error` and `failed`.
//!
//! # Logging
//!
//! Diagnostics go through `tracing`; see
//! [`pusher_client_core::logging::targets`] for target names. Connection
//! attempts and raw inbound frames are also passed to the log hook, which
//! writes to stderr unless replaced with [`set_log_hook`] or
//! [`PusherBuilder::log_hook`].
//!
//! # Custom Transports
//!
//! The default transport is [`WebSocketTransport`]. Anything implementing
//! [`Transport`] can be supplied through [`PusherBuilder::transport`].

mod auth;
mod channel;
mod connection;
mod error;
pub mod options;
pub mod protocol;
mod pusher;
mod state;
pub mod transport;

pub use channel::Channel;
pub use connection::Connection;
pub use error::{PusherError, Result};
pub use options::{PusherAuth, PusherOptions, ReconnectConfig};
pub use pusher::{Pusher, PusherBuilder};
pub use state::ConnectionState;
pub use transport::{Socket, SocketCommand, Transport, WebSocketTransport};

pub use pusher_client_core::{EventEmitter, Listener, LogFn, listener, reset_log_hook, set_log_hook};
