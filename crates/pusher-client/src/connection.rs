//! Connection state machine: socket lifecycle, reconnection, channel registry
//! and inbound routing.
//!
//! # States
//!
//! ```text
//! Initialized --start--> Connecting --connection_established--> Connected
//!                          |   ^                                    |
//!                          +---+ open failed: backoff and retry     |
//!                          ^                                        |
//!                          +---- pusher:error >= 4101, socket lost -+
//!
//! A lost socket waits out the next backoff delay before reopening. The
//! backoff counter only resets once the server confirms a connection.
//!
//! any --disconnect()--> Disconnected --connect()--> Connecting
//! ```
//!
//! Every transition that replaces or drops the socket bumps a generation
//! counter. Background tasks (connect loop, socket reader) and suspended
//! subscribe handshakes carry the generation they started under and stand
//! down once it changes, so nothing from an old socket leaks into a new one.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pusher_client_core::logging::targets;
use pusher_client_core::{EventEmitter, Listener, LogFn};
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::auth::Authorizer;
use crate::channel::Channel;
use crate::error::{PusherError, Result};
use crate::options::PusherOptions;
use crate::protocol::{
    AuthResponse, ConnectionEstablished, ErrorAction, ErrorData, Frame, connection_events, events,
};
use crate::state::ConnectionState;
use crate::transport::{Socket, SocketHandle, Transport};

/// Mutable connection state, guarded by one lock.
struct ConnectionInner {
    state: ConnectionState,
    socket_id: Option<String>,
    /// Backoff counter for consecutive connect failures and socket losses,
    /// starts at 1 and resets once the server confirms a connection.
    retry_attempt: u32,
    generation: u64,
    socket: Option<SocketHandle>,
    channels: HashMap<String, Channel>,
    /// Connect loop or delayed reconnect, aborted on disconnect.
    retry_task: Option<JoinHandle<()>>,
}

pub(crate) struct ConnectionShared {
    api_key: String,
    url: String,
    options: PusherOptions,
    transport: Arc<dyn Transport>,
    authorizer: Authorizer,
    log_hook: Option<LogFn>,
    runtime: Handle,
    emitter: EventEmitter<Value>,
    inner: Mutex<ConnectionInner>,
}

impl ConnectionShared {
    fn log(&self, line: &str) {
        match &self.log_hook {
            Some(hook) => hook(line),
            None => pusher_client_core::log(line),
        }
    }

    fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}

impl Drop for ConnectionShared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(task) = inner.retry_task.take() {
            task.abort();
        }
        if let Some(socket) = inner.socket.take() {
            socket.close_now();
        }
    }
}

/// A connection to the Pusher service.
///
/// Owns the socket, the channel registry and the reconnect policy.
/// Cloning is cheap and yields another handle to the same connection.
///
/// # Events
///
/// Listeners bound with [`bind`](Self::bind) receive:
///
/// - every raw protocol event by name (e.g. `pusher:connection_established`)
/// - `connecting` before each socket open attempt
/// - `connected` once the server assigned a socket id
/// - `disconnected` after [`disconnect`](Self::disconnect)
/// - `error` for transport failures and `pusher:error` frames
/// - `failed` when automatic reconnection gives up
#[derive(Clone)]
pub struct Connection {
    shared: Arc<ConnectionShared>,
}

impl Connection {
    pub(crate) fn new(
        api_key: impl Into<String>,
        options: PusherOptions,
        transport: Arc<dyn Transport>,
        log_hook: Option<LogFn>,
        runtime: Handle,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let url = options.endpoint(&api_key)?.to_string();
        let authorizer = Authorizer::new(options.auth.clone())?;

        Ok(Self {
            shared: Arc::new(ConnectionShared {
                api_key,
                url,
                options,
                transport,
                authorizer,
                log_hook,
                runtime,
                emitter: EventEmitter::new(),
                inner: Mutex::new(ConnectionInner {
                    state: ConnectionState::Initialized,
                    socket_id: None,
                    retry_attempt: 1,
                    generation: 0,
                    socket: None,
                    channels: HashMap::new(),
                    retry_task: None,
                }),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<ConnectionShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnectionShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.shared.runtime
    }

    /// Make the first connect attempt.
    pub(crate) fn start(&self) {
        self.restart(None);
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Whether the server has confirmed the connection.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Socket id assigned by the server, if connected.
    pub fn socket_id(&self) -> Option<String> {
        self.shared.inner.lock().socket_id.clone()
    }

    /// Application key.
    pub fn api_key(&self) -> &str {
        &self.shared.api_key
    }

    /// Socket URL this connection opens.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Options the connection was created with.
    pub fn options(&self) -> &PusherOptions {
        &self.shared.options
    }

    /// Bind a listener to a connection-level event.
    pub fn bind(&self, event: &str, listener: &Listener<Value>) {
        self.shared.emitter.bind(event, listener);
    }

    /// Unbind a listener. Returns `true` if it was bound.
    pub fn unbind(&self, event: &str, listener: &Listener<Value>) -> bool {
        self.shared.emitter.unbind(event, listener)
    }

    /// Look up a channel in the registry.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.shared.inner.lock().channels.get(name).cloned()
    }

    /// Names of all channels in the registry.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.inner.lock().channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Obtain an auth signature for `channel_name`.
    ///
    /// Fails without making a request if the connection has no socket id.
    pub async fn authenticate(&self, channel_name: &str) -> Result<String> {
        Ok(self.authorize(channel_name).await?.auth)
    }

    pub(crate) async fn authorize(&self, channel_name: &str) -> Result<AuthResponse> {
        let socket_id = self
            .socket_id()
            .ok_or_else(|| PusherError::auth("connection not established: no socket id"))?;
        self.shared.authorizer.authorize(channel_name, &socket_id).await
    }

    /// Subscribe to `name`, replacing any existing entry with that name.
    ///
    /// When connected, the subscribe handshake runs before this returns and
    /// its failure is returned. Otherwise the channel waits in the registry
    /// and is subscribed on the next `connected` transition.
    pub async fn subscribe(&self, name: &str, data: Option<String>) -> Result<Channel> {
        let channel = Channel::new(name, data, self.downgrade());
        let (connected, replaced) = {
            let mut inner = self.shared.inner.lock();
            let replaced = inner.channels.insert(name.to_string(), channel.clone());
            (inner.state == ConnectionState::Connected, replaced)
        };
        if let Some(old) = replaced {
            old.set_subscribed(false);
            tracing::debug!(target: targets::CONNECTION, channel = name, "replaced existing channel entry");
        }

        if connected {
            channel.connect().await?;
        }
        Ok(channel)
    }

    /// Remove `name` from the registry and tell the server.
    ///
    /// The unsubscribe frame is sent even if the channel was not registered.
    pub fn unsubscribe(&self, name: &str) {
        let removed = self.shared.inner.lock().channels.remove(name);
        if let Some(channel) = removed {
            channel.set_subscribed(false);
        }

        let frame = Frame::new(events::UNSUBSCRIBE, Some(json!({ "channel": name })));
        if let Err(e) = self.send_frame(&frame) {
            tracing::debug!(target: targets::CONNECTION, channel = name, "unsubscribe frame not sent: {}", e);
        }
    }

    /// Reconnect explicitly, e.g. after [`disconnect`](Self::disconnect) or
    /// after automatic retries gave up. Does nothing while connected.
    pub fn connect(&self) {
        if self.state() != ConnectionState::Connected {
            self.shared.inner.lock().retry_attempt = 1;
            self.restart(None);
        }
    }

    /// Close the socket and stop automatic reconnection.
    ///
    /// Completes once the close handshake finishes. In-flight subscribe
    /// handshakes are invalidated and will not write to any socket.
    pub async fn disconnect(&self) {
        let (socket, task, channels) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.state = ConnectionState::Disconnected;
            inner.socket_id = None;
            let channels: Vec<Channel> = inner.channels.values().cloned().collect();
            (inner.socket.take(), inner.retry_task.take(), channels)
        };
        if let Some(task) = task {
            task.abort();
        }
        for channel in channels {
            channel.set_subscribed(false);
        }
        if let Some(socket) = socket {
            socket.close().await;
        }

        self.shared.log("disconnected");
        tracing::info!(target: targets::CONNECTION, "disconnected");
        self.shared.emitter.broadcast(connection_events::DISCONNECTED, None);
    }

    /// Process one raw inbound frame.
    ///
    /// The event is broadcast to connection listeners first, then handled:
    /// connection establishment, protocol errors and pings are consumed here;
    /// anything else is routed to the channel it names, if registered.
    ///
    /// Frames are attributed to the current socket; with no socket installed
    /// a `pusher:connection_established` is ignored.
    pub fn handle_message(&self, raw: &str) {
        self.handle_frame(self.generation(), raw);
    }

    /// Process a frame read from the socket installed under `generation`.
    fn handle_frame(&self, generation: u64, raw: &str) {
        self.shared.log(raw);

        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(target: targets::CONNECTION, "dropping malformed frame: {}", e);
                return;
            }
        };
        let data = frame.decoded_data();

        self.shared.emitter.broadcast(&frame.event, data.as_ref());

        match frame.event.as_str() {
            events::CONNECTION_ESTABLISHED => self.on_connection_established(generation, data.as_ref()),
            events::ERROR => self.on_protocol_error(generation, data.as_ref()),
            events::PING => {
                if let Err(e) = self.send_frame(&Frame::new(events::PONG, Some(json!({})))) {
                    tracing::debug!(target: targets::CONNECTION, "pong not sent: {}", e);
                }
            }
            _ => self.dispatch_to_channel(&frame, data.as_ref()),
        }
    }

    fn on_connection_established(&self, generation: u64, data: Option<&Value>) {
        let established = match ConnectionEstablished::from_data(data) {
            Ok(established) => established,
            Err(e) => {
                tracing::warn!(target: targets::CONNECTION, "invalid connection_established payload: {}", e);
                self.shared
                    .emitter
                    .broadcast(connection_events::ERROR, Some(&json!({ "message": e.to_string() })));
                return;
            }
        };

        let channels: Vec<Channel> = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation
                || inner.state == ConnectionState::Disconnected
                || inner.socket.is_none()
            {
                tracing::debug!(target: targets::CONNECTION, "ignoring connection_established from a stale socket");
                return;
            }
            inner.socket_id = Some(established.socket_id.clone());
            inner.state = ConnectionState::Connected;
            inner.retry_attempt = 1;
            inner.channels.values().cloned().collect()
        };

        tracing::info!(
            target: targets::CONNECTION,
            socket_id = %established.socket_id,
            channels = channels.len(),
            "connected"
        );
        self.shared.emitter.broadcast(connection_events::CONNECTED, data);

        for channel in channels {
            channel.spawn_connect();
        }
    }

    fn on_protocol_error(&self, generation: u64, data: Option<&Value>) {
        let error = ErrorData::from_data(data);
        let action = error.action();
        let mut payload = json!({ "code": error.code, "message": error.message });
        let err = PusherError::from(error);
        tracing::warn!(target: targets::CONNECTION, ?action, "server reported error: {}", err);
        payload["error"] = Value::String(err.to_string());
        self.shared.emitter.broadcast(connection_events::ERROR, Some(&payload));

        let current = {
            let inner = self.shared.inner.lock();
            inner.generation == generation && inner.state != ConnectionState::Disconnected
        };
        if !current {
            return;
        }
        match action {
            ErrorAction::ReconnectNow => self.restart(None),
            ErrorAction::ReconnectAfterDelay => {
                self.restart(Some(self.shared.options.reconnect.protocol_error_delay))
            }
            ErrorAction::Report => {}
        }
    }

    fn dispatch_to_channel(&self, frame: &Frame, data: Option<&Value>) {
        let Some(name) = frame.target_channel() else {
            tracing::trace!(target: targets::CONNECTION, event = %frame.event, "event without channel");
            return;
        };
        match self.channel(&name) {
            Some(channel) => channel.handle_event(&frame.event, data),
            None => {
                tracing::trace!(target: targets::CONNECTION, event = %frame.event, channel = %name, "event for unknown channel");
            }
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.shared.generation()
    }

    /// Take the next backoff delay and advance the counter.
    fn next_backoff_delay(&self) -> Duration {
        let attempt = {
            let mut inner = self.shared.inner.lock();
            let attempt = inner.retry_attempt;
            inner.retry_attempt = inner.retry_attempt.saturating_add(1);
            attempt
        };
        self.shared.options.reconnect.delay_for_attempt(attempt)
    }

    /// Write a frame to the current socket.
    pub(crate) fn send_frame(&self, frame: &Frame) -> Result<()> {
        let text = frame.to_text()?;
        let socket = self
            .shared
            .inner
            .lock()
            .socket
            .clone()
            .ok_or_else(|| PusherError::WebSocket("not connected".into()))?;
        socket.send_text(text)
    }

    /// Write a frame for `channel` only if the connection is still connected
    /// under `generation` and `channel` is still the registry entry for its
    /// name.
    pub(crate) fn send_channel_frame_if_current(
        &self,
        generation: u64,
        channel: &Channel,
        frame: &Frame,
    ) -> Result<()> {
        let text = frame.to_text()?;
        let inner = self.shared.inner.lock();
        let registered = inner
            .channels
            .get(channel.name())
            .is_some_and(|entry| entry.same_channel(channel));
        if inner.generation != generation || inner.state != ConnectionState::Connected || !registered {
            return Err(PusherError::Cancelled);
        }
        match &inner.socket {
            Some(socket) => socket.send_text(text),
            None => Err(PusherError::WebSocket("not connected".into())),
        }
    }

    /// Drop the current socket and start a fresh connect loop, optionally
    /// after `delay`. The backoff counter carries over; only a confirmed
    /// connection or an explicit [`connect`](Self::connect) resets it.
    fn restart(&self, delay: Option<Duration>) {
        let (old_socket, old_task, channels, generation) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.state = ConnectionState::Connecting;
            inner.socket_id = None;
            let channels: Vec<Channel> = inner.channels.values().cloned().collect();
            (inner.socket.take(), inner.retry_task.take(), channels, inner.generation)
        };
        if let Some(task) = old_task {
            task.abort();
        }
        if let Some(socket) = old_socket {
            socket.close_now();
        }
        for channel in channels {
            channel.set_subscribed(false);
        }

        let weak = self.downgrade();
        let task = self.shared.runtime.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            connect_loop(weak, generation).await;
        });

        let mut inner = self.shared.inner.lock();
        if inner.generation == generation {
            inner.retry_task = Some(task);
        } else {
            task.abort();
        }
    }

    fn install_socket(&self, generation: u64, socket: Socket) {
        let Socket { outgoing, incoming } = socket;
        let handle = SocketHandle::new(outgoing);
        {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                drop(inner);
                handle.close_now();
                return;
            }
            inner.socket = Some(handle);
        }
        tracing::debug!(target: targets::CONNECTION, "socket open, waiting for connection_established");
        self.shared
            .runtime
            .spawn(read_loop(self.downgrade(), generation, incoming));
    }
}

/// Open a socket, retrying with backoff until it succeeds, the generation
/// changes, or the waiting budget runs out.
async fn connect_loop(weak: Weak<ConnectionShared>, generation: u64) {
    let mut waited = Duration::ZERO;
    loop {
        let Some(shared) = weak.upgrade() else { return };
        if shared.generation() != generation {
            return;
        }
        shared.log(&format!("connecting to {}", shared.url));
        shared.emitter.broadcast(connection_events::CONNECTING, None);
        let open = shared.transport.open(&shared.url);
        drop(shared);

        let result = open.await;

        let Some(shared) = weak.upgrade() else { return };
        let connection = Connection::from_shared(shared);
        let err = match result {
            Ok(socket) => {
                connection.install_socket(generation, socket);
                return;
            }
            Err(err) => err,
        };

        let attempt = {
            let mut inner = connection.shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            let attempt = inner.retry_attempt;
            inner.retry_attempt = inner.retry_attempt.saturating_add(1);
            attempt
        };
        let reconnect = &connection.shared.options.reconnect;
        let delay = reconnect.delay_for_attempt(attempt);

        tracing::warn!(target: targets::CONNECTION, attempt, "connect failed: {}", err);
        connection
            .shared
            .emitter
            .broadcast(connection_events::ERROR, Some(&json!({ "message": err.to_string() })));

        if waited + delay > reconnect.max_elapsed {
            connection
                .shared
                .log(&format!("giving up after {attempt} attempts: {err}"));
            tracing::error!(target: targets::CONNECTION, attempt, "reconnect budget exhausted, giving up");
            connection.shared.emitter.broadcast(
                connection_events::FAILED,
                Some(&json!({ "attempts": attempt, "message": err.to_string() })),
            );
            return;
        }

        connection
            .shared
            .log(&format!("connect attempt {attempt} failed ({err}), retrying in {delay:?}"));
        drop(connection);
        tokio::time::sleep(delay).await;
        waited += delay;
    }
}

/// Feed inbound frames to the connection in arrival order.
async fn read_loop(
    weak: Weak<ConnectionShared>,
    generation: u64,
    mut incoming: tokio::sync::mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = incoming.recv().await {
        let Some(shared) = weak.upgrade() else { return };
        if shared.generation() != generation {
            return;
        }
        Connection::from_shared(shared).handle_frame(generation, &text);
    }

    let Some(shared) = weak.upgrade() else { return };
    let connection = Connection::from_shared(shared);
    if connection.generation() == generation && connection.state() != ConnectionState::Disconnected {
        let delay = connection.next_backoff_delay();
        tracing::warn!(target: targets::CONNECTION, ?delay, "socket closed unexpectedly, reconnecting");
        connection.shared.emitter.broadcast(
            connection_events::ERROR,
            Some(&json!({ "message": "socket closed unexpectedly" })),
        );
        connection.restart(Some(delay));
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Connection")
            .field("url", &self.shared.url)
            .field("state", &inner.state)
            .field("socket_id", &inner.socket_id)
            .field("channels", &inner.channels.len())
            .finish()
    }
}
