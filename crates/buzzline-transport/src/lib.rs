//! Transport layer for Buzzline.
//!
//! Accepting a connection is split in two steps. [`Transport::accept`]
//! only takes the TCP connection off the listener, so one slow client
//! can never hold up the accept loop. The WebSocket upgrade then happens
//! on the connection's own task via [`PendingConnection::upgrade`].
//!
//! An upgraded [`WebSocketConnection`] splits into a [`WsReader`] and a
//! [`WsWriter`], so reading and writing can run on separate tasks.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use buzzline_protocol::ConnectionId;
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    PendingConnection, WebSocketConnection, WebSocketTransport, WsReader, WsWriter,
    DEFAULT_HANDSHAKE_TIMEOUT,
};

use std::net::SocketAddr;

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// What [`accept`](Transport::accept) hands out.
    type Connection: Send + 'static;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// The address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}
