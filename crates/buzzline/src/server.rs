//! `BuzzlineServer` builder and accept loop.
//!
//! This is the entry point for running a Buzzline server. It ties the
//! layers together: transport → protocol → room registry.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use buzzline_protocol::{Codec, JsonCodec};
use buzzline_room::{RoomConfig, RoomRegistry};
use buzzline_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{BuzzlineError, ServerConfig};

/// Reason sent in `roomClosed` when the server stops.
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Buzzline server.
///
/// # Example
///
/// ```rust,ignore
/// use buzzline::prelude::*;
///
/// let server = BuzzlineServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct BuzzlineServerBuilder {
    config: ServerConfig,
}

impl BuzzlineServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the room configuration.
    pub fn room_config(mut self, room: RoomConfig) -> Self {
        self.config.room = room;
        self
    }

    /// Sets how long a silent connection is kept.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<BuzzlineServer<JsonCodec>, BuzzlineError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_handshake_timeout(self.config.handshake_timeout);

        let state = Arc::new(ServerState {
            registry: Arc::new(RoomRegistry::new(self.config.room.clone())),
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(BuzzlineServer { transport, state })
    }
}

impl Default for BuzzlineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Buzzline server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BuzzlineServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl BuzzlineServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> BuzzlineServerBuilder {
        BuzzlineServerBuilder::new()
    }
}

impl<C: Codec> BuzzlineServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BuzzlineError> {
        Ok(self.transport.local_addr()?)
    }

    /// The room registry every connection talks to.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), BuzzlineError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then closes every
    /// room so members get `roomClosed` before the process exits.
    ///
    /// Each accepted connection gets its own task, which performs the
    /// WebSocket upgrade and then serves the client.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), BuzzlineError> {
        tokio::pin!(shutdown);
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Buzzline server running");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    self.state.registry.close_all(SHUTDOWN_REASON).await;
                    return Ok(());
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(pending, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }
    }
}
