//! Error types for the room layer.

use buzzline_protocol::{ConnectionId, FailureKind, GamePhase, RoomCode, ServerMessage};

/// Errors that can occur during room operations.
///
/// Every variant is recoverable: it is reported to the requesting
/// connection and the room carries on serving everyone else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The connection is not a member of any room.
    #[error("{0} is not in a room")]
    NoRoom(ConnectionId),

    /// The requester may not perform this action.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No more member slots under the room's `maxPlayers`.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// Joining is only possible in the lobby.
    #[error("room {0} cannot be joined while in {1}")]
    NotJoinable(RoomCode, GamePhase),

    /// Proposed settings were rejected; nothing was applied.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Too few participants to start.
    #[error("need at least {required} participant(s) to start, have {present}")]
    InsufficientPlayers { required: usize, present: usize },

    /// The command doesn't apply to the room's current phase.
    #[error("cannot {action} while in {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: GamePhase,
    },

    /// The target of the command is not a member of the room.
    #[error("{0} is not in this room")]
    NotInRoom(ConnectionId),

    /// The connection already belongs to a room.
    #[error("{0} is already in room {1}")]
    AlreadyInRoom(ConnectionId, RoomCode),

    /// Username empty or too long.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// The room actor has stopped (closed or emptied concurrently).
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// The client-facing category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) | Self::NoRoom(_) | Self::Unavailable(_) => FailureKind::RoomNotFound,
            Self::NotAuthorized(_) => FailureKind::NotAuthorized,
            Self::RoomFull(_) => FailureKind::RoomFull,
            Self::NotJoinable(..) => FailureKind::RoomNotJoinable,
            Self::InvalidSettings(_) => FailureKind::InvalidSettings,
            Self::InsufficientPlayers { .. } => FailureKind::InsufficientPlayers,
            Self::InvalidPhase { .. } => FailureKind::InvalidPhase,
            Self::NotInRoom(_) | Self::AlreadyInRoom(..) | Self::InvalidUsername(_) => {
                FailureKind::BadRequest
            }
        }
    }

    /// The single notification sent back to the requester.
    pub fn to_notification(&self) -> ServerMessage {
        match self {
            Self::NotAuthorized(reason) => ServerMessage::NotAuthorized {
                reason: reason.clone(),
            },
            _ if self.kind() == FailureKind::RoomNotFound => ServerMessage::RoomNotFound,
            _ => ServerMessage::Error {
                kind: self.kind(),
                message: self.to_string(),
            },
        }
    }
}
