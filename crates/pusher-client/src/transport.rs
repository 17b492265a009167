//! Socket transport used by the connection.
//!
//! The connection never touches a WebSocket directly. It asks a [`Transport`]
//! to open a [`Socket`], which is a pair of channels: commands going out and
//! text frames coming in. [`WebSocketTransport`] implements this over
//! tokio-tungstenite; tests and embedders can supply their own.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use pusher_client_core::logging::targets;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

use crate::error::{PusherError, Result};

/// How long to wait for the server's close reply before giving up.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Command sent to a socket.
#[derive(Debug)]
pub enum SocketCommand {
    /// Write a text frame.
    Text(String),
    /// Close the socket. The sender, if any, fires once the close
    /// handshake is done.
    Close(Option<oneshot::Sender<()>>),
}

/// An open socket.
///
/// When the peer goes away the transport drops its end of `incoming`, so
/// `incoming.recv()` yields `None`.
#[derive(Debug)]
pub struct Socket {
    /// Outbound commands.
    pub outgoing: mpsc::UnboundedSender<SocketCommand>,
    /// Inbound text frames.
    pub incoming: mpsc::UnboundedReceiver<String>,
}

impl Socket {
    /// Assemble a socket from its two channel ends.
    pub fn new(
        outgoing: mpsc::UnboundedSender<SocketCommand>,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { outgoing, incoming }
    }
}

/// Opens sockets to a URL.
pub trait Transport: Send + Sync + 'static {
    /// Open a socket to `url`.
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Socket>>;
}

/// Write half of an installed socket, owned by the connection.
#[derive(Debug, Clone)]
pub(crate) struct SocketHandle {
    outgoing: mpsc::UnboundedSender<SocketCommand>,
}

impl SocketHandle {
    pub(crate) fn new(outgoing: mpsc::UnboundedSender<SocketCommand>) -> Self {
        Self { outgoing }
    }

    /// Queue a text frame. Fails if the socket is gone.
    pub(crate) fn send_text(&self, text: String) -> Result<()> {
        self.outgoing
            .send(SocketCommand::Text(text))
            .map_err(|_| PusherError::WebSocket("socket closed".into()))
    }

    /// Ask the socket to close without waiting for the handshake.
    pub(crate) fn close_now(&self) {
        let _ = self.outgoing.send(SocketCommand::Close(None));
    }

    /// Close the socket and wait for the handshake to finish.
    pub(crate) async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.outgoing.send(SocketCommand::Close(Some(ack_tx))).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

/// [`Transport`] backed by tokio-tungstenite.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl WebSocketTransport {
    /// Create a transport with the given socket open timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect(url: String, timeout: Duration) -> Result<Socket> {
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| PusherError::InvalidUrl(e.to_string()))?;

        let (ws_stream, _response) =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| PusherError::Connection(format!("timed out connecting to {url}")))?
                .map_err(|e| PusherError::Connection(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SocketCommand>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = out_rx.recv() => {
                        match cmd {
                            Some(SocketCommand::Text(text)) => {
                                if let Err(e) = write.send(Message::Text(text.into())).await {
                                    tracing::warn!(target: targets::TRANSPORT, "write failed: {}", e);
                                    break;
                                }
                            }
                            Some(SocketCommand::Close(ack)) => {
                                let _ = write.send(Message::Close(None)).await;
                                // Wait for the peer's close reply.
                                let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
                                    while let Some(Ok(msg)) = read.next().await {
                                        if msg.is_close() {
                                            break;
                                        }
                                    }
                                })
                                .await;
                                if let Some(ack) = ack {
                                    let _ = ack.send(());
                                }
                                break;
                            }
                            None => {
                                let _ = write.close().await;
                                break;
                            }
                        }
                    }

                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text.as_str().to_owned()).is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::debug!(target: targets::TRANSPORT, ?frame, "server closed socket");
                                break;
                            }
                            Some(Ok(_)) => {
                                // Pings are answered by tungstenite; binary frames are not part of the protocol.
                            }
                            Some(Err(e)) => {
                                tracing::warn!(target: targets::TRANSPORT, "read failed: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            tracing::debug!(target: targets::TRANSPORT, "socket pump finished");
        });

        Ok(Socket::new(out_tx, in_rx))
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &str) -> BoxFuture<'static, Result<Socket>> {
        Self::connect(url.to_string(), self.connect_timeout).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_send_after_socket_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(tx);
        drop(rx);

        assert!(handle.send_text("{}".into()).is_err());
        // Close on a dead socket returns immediately.
        handle.close().await;
    }

    #[tokio::test]
    async fn test_handle_close_waits_for_ack() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(tx);

        let peer = tokio::spawn(async move {
            match rx.recv().await {
                Some(SocketCommand::Close(Some(ack))) => {
                    let _ = ack.send(());
                    true
                }
                _ => false,
            }
        });

        handle.close().await;
        assert!(peer.await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let transport = WebSocketTransport::new(Duration::from_secs(2));
        // Port 1 on loopback is not listening.
        let result = transport.open("ws://127.0.0.1:1/app/key").await;
        assert!(matches!(result, Err(PusherError::Connection(_))));
    }
}
