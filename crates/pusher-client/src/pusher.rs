//! Entry point owning one connection.

use std::sync::Arc;

use pusher_client_core::{Listener, LogFn};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::channel::Channel;
use crate::connection::Connection;
use crate::error::{PusherError, Result};
use crate::options::PusherOptions;
use crate::state::ConnectionState;
use crate::transport::{Transport, WebSocketTransport};

/// Builder for [`Pusher`].
pub struct PusherBuilder {
    api_key: String,
    options: PusherOptions,
    transport: Option<Arc<dyn Transport>>,
    log_hook: Option<LogFn>,
}

impl PusherBuilder {
    /// Create a builder for the given application key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            options: PusherOptions::default(),
            transport: None,
            log_hook: None,
        }
    }

    /// Set the connection options.
    pub fn options(mut self, options: PusherOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a custom transport instead of [`WebSocketTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a log hook for this client instead of the process-wide one.
    pub fn log_hook(mut self, hook: LogFn) -> Self {
        self.log_hook = Some(hook);
        self
    }

    /// Create the client and start connecting.
    ///
    /// Must be called from within a tokio runtime; background tasks are
    /// spawned on it.
    pub fn build(self) -> Result<Pusher> {
        let runtime = Handle::try_current().map_err(|_| PusherError::NoRuntime)?;
        let connect_timeout = self.options.connect_timeout;
        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(WebSocketTransport::new(connect_timeout)) as Arc<dyn Transport>
        });

        let connection = Connection::new(self.api_key, self.options, transport, self.log_hook, runtime)?;
        connection.start();
        Ok(Pusher { connection })
    }
}

/// A Pusher client.
///
/// Construction immediately starts connecting. Channels can be subscribed at
/// any time; those subscribed before the connection is up are subscribed as
/// soon as it is.
///
/// # Example
///
/// ```ignore
/// use pusher_client::{listener, Pusher, PusherAuth, PusherOptions};
///
/// let options = PusherOptions::new()
///     .cluster("eu")
///     .auth(PusherAuth::new("https://example.com/broadcasting/auth")
///         .header("Authorization", "Bearer token"));
/// let pusher = Pusher::new("app-key", options)?;
///
/// let channel = pusher.subscribe("private-orders", None).await?;
/// channel.bind("order-created", &listener(|data| println!("{data:?}")));
///
/// pusher.disconnect().await;
/// ```
#[derive(Debug)]
pub struct Pusher {
    connection: Connection,
}

impl Pusher {
    /// Create a client with the default transport and start connecting.
    pub fn new(api_key: impl Into<String>, options: PusherOptions) -> Result<Self> {
        Self::builder(api_key).options(options).build()
    }

    /// Start building a client.
    pub fn builder(api_key: impl Into<String>) -> PusherBuilder {
        PusherBuilder::new(api_key)
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Socket id assigned by the server, if connected.
    pub fn socket_id(&self) -> Option<String> {
        self.connection.socket_id()
    }

    /// Subscribe to a channel. See [`Connection::subscribe`].
    pub async fn subscribe(&self, name: &str, data: Option<String>) -> Result<Channel> {
        self.connection.subscribe(name, data).await
    }

    /// Unsubscribe from a channel. See [`Connection::unsubscribe`].
    pub fn unsubscribe(&self, name: &str) {
        self.connection.unsubscribe(name);
    }

    /// Look up a subscribed channel.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.connection.channel(name)
    }

    /// Reconnect after a disconnect or after retries gave up.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Close the connection. See [`Connection::disconnect`].
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Bind a listener to a connection-level event.
    pub fn bind(&self, event: &str, listener: &Listener<Value>) {
        self.connection.bind(event, listener);
    }

    /// Unbind a connection-level listener.
    pub fn unbind(&self, event: &str, listener: &Listener<Value>) -> bool {
        self.connection.unbind(event, listener)
    }
}
