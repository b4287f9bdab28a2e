//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::{ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Default limit on how long a client may take to finish the upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

fn io_error(kind: std::io::ErrorKind, e: tokio_tungstenite::tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, %local, "WebSocket transport listening");
        Ok(Self {
            listener,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets the upgrade deadline for connections accepted from now on.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Transport for WebSocketTransport {
    type Connection = PendingConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted TCP connection");

        Ok(PendingConnection {
            id,
            addr,
            stream,
            handshake_timeout: self.handshake_timeout,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }
}

/// A TCP connection that has not finished the WebSocket upgrade yet.
pub struct PendingConnection {
    id: ConnectionId,
    addr: SocketAddr,
    stream: TcpStream,
    handshake_timeout: Duration,
}

impl PendingConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Performs the WebSocket upgrade, bounded by the handshake timeout.
    pub async fn upgrade(self) -> Result<WebSocketConnection, TransportError> {
        let ws = tokio::time::timeout(
            self.handshake_timeout,
            tokio_tungstenite::accept_async(self.stream),
        )
        .await
        .map_err(|_| TransportError::HandshakeTimeout)?
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

        tracing::debug!(id = %self.id, addr = %self.addr, "WebSocket upgrade complete");
        Ok(WebSocketConnection {
            id: self.id,
            addr: self.addr,
            ws,
        })
    }
}

/// A single upgraded WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    ws: WsStream,
}

impl WebSocketConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Splits the connection into independently owned halves.
    pub fn split(self) -> (WsReader, WsWriter) {
        let (sink, stream) = self.ws.split();
        (
            WsReader {
                id: self.id,
                stream,
            },
            WsWriter { id: self.id, sink },
        )
    }
}

/// The receiving half of a [`WebSocketConnection`].
pub struct WsReader {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
}

impl WsReader {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receives the next data frame. Text and binary frames are both
    /// returned as bytes; control frames are skipped.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }
}

/// The sending half of a [`WebSocketConnection`].
pub struct WsWriter {
    id: ConnectionId,
    sink: SplitSink<WsStream, Message>,
}

impl WsWriter {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Sends a binary frame.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.send_message(Message::Binary(data.to_vec().into())).await
    }

    /// Sends a text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send_message(Message::Text(text.into())).await
    }

    /// Sends a close frame and flushes.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }

    async fn send_message(&mut self, msg: Message) -> Result<(), TransportError> {
        self.sink
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e)))
    }
}
