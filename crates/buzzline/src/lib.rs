//! # Buzzline
//!
//! Real-time buzzer quiz server. Players join a room by code, the host
//! starts timed rounds, and the server decides who buzzed first.
//!
//! The server is authoritative: buzz order is the order in which the
//! room receives them, never a client timestamp. Every change to a room
//! is broadcast to its members as a full `roomState` snapshot.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use buzzline::prelude::*;
//!
//! # async fn start() -> Result<(), BuzzlineError> {
//! let server = BuzzlineServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;
mod telemetry;

pub use config::ServerConfig;
pub use error::BuzzlineError;
pub use server::{BuzzlineServer, BuzzlineServerBuilder, SHUTDOWN_REASON};
pub use telemetry::init_tracing;

/// Everything needed to embed or talk to a Buzzline server.
pub mod prelude {
    pub use crate::{
        init_tracing, BuzzlineError, BuzzlineServer, BuzzlineServerBuilder, ServerConfig,
    };
    pub use buzzline_protocol::{
        ClientMessage, Codec, ConnectionId, Envelope, FailureKind, GamePhase, GameSettings,
        JsonCodec, PlayerInfo, RoomCode, RoomSnapshot, ServerMessage, TeamId,
    };
    pub use buzzline_room::{RoomConfig, RoomRegistry};
}
