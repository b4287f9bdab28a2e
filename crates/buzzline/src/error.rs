//! Unified error type for the Buzzline server.

use buzzline_protocol::ProtocolError;
use buzzline_room::RoomError;
use buzzline_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum BuzzlineError {
    /// A transport-level error (bind, accept, upgrade, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, not authorized, wrong phase).
    #[error(transparent)]
    Room(#[from] RoomError),
}
