//! A subscribed channel.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use pusher_client_core::logging::targets;
use pusher_client_core::{EventEmitter, Listener};
use serde_json::{Value, json};

use crate::connection::{Connection, ConnectionShared};
use crate::error::{PusherError, Result};
use crate::protocol::{self, Frame, SubscribeData, events};

struct ChannelInner {
    name: String,
    subscription_data: Option<String>,
    /// Non-owning: the connection owns the registry this channel lives in.
    connection: Weak<ConnectionShared>,
    emitter: EventEmitter<Value>,
    subscribed: AtomicBool,
}

/// One channel in a connection's registry.
///
/// Channels named `private-*` or `presence-*` authenticate against the
/// configured auth endpoint before subscribing; all others subscribe
/// directly. Cloning yields another handle to the same channel.
///
/// Listeners bound here only see events addressed to this channel.
/// Server events prefixed `pusher_internal:` arrive as `pusher:` events,
/// e.g. `pusher:subscription_succeeded`.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(
        name: impl Into<String>,
        subscription_data: Option<String>,
        connection: Weak<ConnectionShared>,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                subscription_data,
                connection,
                emitter: EventEmitter::new(),
                subscribed: AtomicBool::new(false),
            }),
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Data passed at subscribe time, sent as `channel_data`.
    pub fn subscription_data(&self) -> Option<&str> {
        self.inner.subscription_data.as_deref()
    }

    /// Whether subscribing requires an auth signature.
    pub fn requires_auth(&self) -> bool {
        protocol::requires_auth(&self.inner.name)
    }

    /// Whether the server confirmed the subscription on the current socket.
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscribed.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same channel entry.
    pub(crate) fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_subscribed(&self, subscribed: bool) {
        self.inner.subscribed.store(subscribed, Ordering::SeqCst);
    }

    /// Bind a listener to an event on this channel.
    pub fn bind(&self, event: &str, listener: &Listener<Value>) {
        self.inner.emitter.bind(event, listener);
    }

    /// Unbind a listener. Returns `true` if it was bound.
    pub fn unbind(&self, event: &str, listener: &Listener<Value>) -> bool {
        self.inner.emitter.unbind(event, listener)
    }

    /// Send an event on this channel.
    ///
    /// Returns `true` if the frame was handed to the socket. This is not a
    /// delivery guarantee.
    pub fn trigger(&self, event: &str, data: Value) -> bool {
        let Some(connection) = self.connection() else {
            return false;
        };
        let frame = Frame::new(event, Some(data)).on_channel(self.name());
        match connection.send_frame(&frame) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(target: targets::CHANNEL, channel = self.name(), event, "trigger failed: {}", e);
                false
            }
        }
    }

    /// Run the subscribe handshake.
    ///
    /// Restricted channels authenticate first; an auth failure fails the
    /// handshake and no subscribe frame is sent. Failures other than
    /// cancellation are also broadcast as `pusher:subscription_error`.
    ///
    /// Returns [`PusherError::Cancelled`] without writing anything if, by the
    /// time the frame is ready, this handle is no longer the connection's
    /// registry entry for its name (unsubscribed or replaced) or the socket
    /// it started on was replaced.
    pub async fn connect(&self) -> Result<()> {
        let result = self.subscribe_handshake().await;
        if let Err(err) = &result
            && *err != PusherError::Cancelled
        {
            tracing::warn!(target: targets::CHANNEL, channel = self.name(), "subscribe failed: {}", err);
            self.inner.emitter.broadcast(
                events::SUBSCRIPTION_ERROR,
                Some(&json!({ "error": err.to_string() })),
            );
        }
        result
    }

    async fn subscribe_handshake(&self) -> Result<()> {
        let connection = self
            .connection()
            .ok_or_else(|| PusherError::WebSocket("connection dropped".into()))?;
        let generation = connection.generation();

        let mut channel_data = self.inner.subscription_data.clone();
        let auth = if self.requires_auth() {
            let response = connection.authorize(self.name()).await?;
            if channel_data.is_none() {
                channel_data = response.channel_data;
            }
            Some(response.auth)
        } else {
            None
        };

        let data = SubscribeData {
            channel: self.name().to_string(),
            auth,
            channel_data,
        };
        let frame = Frame::new(events::SUBSCRIBE, Some(serde_json::to_value(data)?));
        connection.send_channel_frame_if_current(generation, self, &frame)?;
        tracing::debug!(target: targets::CHANNEL, channel = self.name(), "subscribe frame sent");
        Ok(())
    }

    /// Run the handshake in the background, e.g. on (re)connect.
    pub(crate) fn spawn_connect(&self) {
        let Some(connection) = self.connection() else {
            return;
        };
        let channel = self.clone();
        connection.runtime().spawn(async move {
            if let Err(PusherError::Cancelled) = channel.connect().await {
                tracing::debug!(target: targets::CHANNEL, channel = channel.name(), "stale subscribe dropped");
            }
        });
    }

    /// Deliver an inbound event to this channel's listeners.
    pub(crate) fn handle_event(&self, event: &str, data: Option<&Value>) {
        let event = match event.strip_prefix(events::INTERNAL_PREFIX) {
            Some(rest) => Cow::Owned(format!("{}{rest}", events::PUBLIC_PREFIX)),
            None => Cow::Borrowed(event),
        };
        if event == events::SUBSCRIPTION_SUCCEEDED {
            self.set_subscribed(true);
        }
        self.inner.emitter.broadcast(&event, data);
    }

    fn connection(&self) -> Option<Connection> {
        self.inner.connection.upgrade().map(Connection::from_shared)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.inner.name)
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}
