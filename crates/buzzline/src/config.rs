//! Server configuration.

use std::time::Duration;

use buzzline_room::RoomConfig;
use serde::{Deserialize, Serialize};

/// Everything needed to start a [`BuzzlineServer`](crate::BuzzlineServer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,

    /// A connection that sends nothing for this long is dropped. Clients
    /// keep quiet connections alive with `ping`.
    pub idle_timeout: Duration,

    /// Limit on the WebSocket upgrade after the TCP accept.
    pub handshake_timeout: Duration,

    /// Settings shared by every room.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: buzzline_transport::DEFAULT_HANDSHAKE_TIMEOUT,
            room: RoomConfig::default(),
        }
    }
}
