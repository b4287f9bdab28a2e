//! Wire protocol for Buzzline.
//!
//! This crate defines everything that crosses the boundary between the
//! game engine and its clients:
//!
//! - **Types** ([`ConnectionId`], [`RoomCode`], [`GameSettings`],
//!   [`RoomSnapshot`], etc.): the data a room exposes.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`], [`Envelope`]):
//!   the commands clients submit and the notifications rooms emit.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding
//!   or decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Room engine
//! Room engine → Protocol (ServerMessage) → Envelope → Transport (bytes)
//! ```
//!
//! The protocol layer knows nothing about rooms or timers. It only
//! describes shapes, so the engine and any client SDK agree on JSON.

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{ClientMessage, Envelope, FailureKind, ServerMessage};
pub use types::{
    BuzzEntry, ConnectionId, GamePhase, GameSettings, PlayerInfo, RoomCode,
    RoomSnapshot, TeamId,
};
