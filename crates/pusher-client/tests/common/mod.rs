//! Shared helpers for connection tests: an in-memory transport and
//! listener plumbing.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pusher_client::{
    Listener, Pusher, PusherError, PusherOptions, Socket, SocketCommand, Transport, listener,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// How long helpers wait for something that should happen.
pub const WAIT: Duration = Duration::from_secs(5);
/// How long helpers wait to confirm something did not happen.
pub const QUIET: Duration = Duration::from_millis(200);

/// Server side of a socket opened through [`MockTransport`].
pub struct MockSocket {
    pub url: String,
    commands: mpsc::UnboundedReceiver<SocketCommand>,
    to_client: Option<mpsc::UnboundedSender<String>>,
}

impl MockSocket {
    /// Deliver a frame to the client.
    pub fn send(&self, frame: Value) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(frame.to_string());
        }
    }

    /// Deliver raw text to the client.
    pub fn send_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.to_string());
        }
    }

    /// Confirm the connection with `socket_id`.
    pub fn establish(&self, socket_id: &str) {
        self.send(json!({
            "event": "pusher:connection_established",
            "data": json!({ "socket_id": socket_id, "activity_timeout": 120 }).to_string(),
        }));
    }

    /// Drop the server side of the socket, as if the peer went away.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Next text frame written by the client, or `None` if the client closed
    /// the socket or nothing arrived within `within`.
    pub async fn next_frame_within(&mut self, within: Duration) -> Option<Value> {
        let result = tokio::time::timeout(within, self.commands.recv()).await;
        match result {
            Ok(Some(SocketCommand::Text(text))) => serde_json::from_str(&text).ok(),
            Ok(Some(SocketCommand::Close(ack))) => {
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                None
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Next text frame, failing the test if none arrives.
    pub async fn next_frame(&mut self) -> Value {
        self.next_frame_within(WAIT).await.expect("expected a frame from the client")
    }

    /// Whether the client closed this socket within `within`.
    pub async fn closed_within(&mut self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            match tokio::time::timeout_at(deadline, self.commands.recv()).await {
                Ok(Some(SocketCommand::Close(ack))) => {
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    return true;
                }
                Ok(Some(SocketCommand::Text(_))) => continue,
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

/// Transport handing the server side of every opened socket to the test.
pub struct MockTransport {
    sockets: mpsc::UnboundedSender<MockSocket>,
    failures_left: AtomicUsize,
    opens: AtomicUsize,
}

impl MockTransport {
    /// Create a transport whose first `failures` opens fail.
    pub fn failing(failures: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MockSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sockets: tx,
            failures_left: AtomicUsize::new(failures),
            opens: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    /// Create a transport where every open succeeds.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSocket>) {
        Self::failing(0)
    }

    /// Number of open attempts so far, failed ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn open(&self, url: &str) -> BoxFuture<'static, pusher_client::Result<Socket>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return async { Err(PusherError::Connection("connection refused".into())) }.boxed();
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let _ = self.sockets.send(MockSocket {
            url: url.to_string(),
            commands: out_rx,
            to_client: Some(in_tx),
        });
        async move { Ok(Socket::new(out_tx, in_rx)) }.boxed()
    }
}

/// A listener forwarding every payload into a channel.
pub fn recorder() -> (Listener<Value>, mpsc::UnboundedReceiver<Option<Value>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let l = listener(move |data: Option<&Value>| {
        let _ = tx.send(data.cloned());
    });
    (l, rx)
}

/// Wait for the next recorded payload.
pub async fn recv_within(
    rx: &mut mpsc::UnboundedReceiver<Option<Value>>,
    within: Duration,
) -> Option<Option<Value>> {
    tokio::time::timeout(within, rx.recv()).await.ok().flatten()
}

/// Build a client on a mock transport.
pub fn mock_pusher(
    options: PusherOptions,
) -> (Pusher, Arc<MockTransport>, mpsc::UnboundedReceiver<MockSocket>) {
    let (transport, sockets) = MockTransport::new();
    let pusher = Pusher::builder("app-key")
        .options(options)
        .transport(transport.clone())
        .log_hook(Arc::new(|_: &str| {}))
        .build()
        .expect("client builds");
    (pusher, transport, sockets)
}

/// A client driven to `connected` on a mock transport.
pub struct Connected {
    pub pusher: Pusher,
    pub transport: Arc<MockTransport>,
    pub server: MockSocket,
    /// Sockets opened by later reconnects.
    pub sockets: mpsc::UnboundedReceiver<MockSocket>,
}

/// Build a client and drive it to `connected` with `socket_id`.
pub async fn connected_pusher(options: PusherOptions, socket_id: &str) -> Connected {
    let (pusher, transport, mut sockets) = mock_pusher(options);
    let server = next_socket(&mut sockets).await;

    let (on_connected, mut connected) = recorder();
    pusher.bind("connected", &on_connected);
    server.establish(socket_id);
    recv_within(&mut connected, WAIT).await.expect("connected event");
    pusher.unbind("connected", &on_connected);

    Connected {
        pusher,
        transport,
        server,
        sockets,
    }
}

/// Wait for the client to open its next socket.
pub async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<MockSocket>) -> MockSocket {
    tokio::time::timeout(WAIT, sockets.recv())
        .await
        .expect("socket opened")
        .expect("transport alive")
}
