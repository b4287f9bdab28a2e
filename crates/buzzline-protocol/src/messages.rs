//! Commands from clients and notifications from rooms.
//!
//! Both enums are internally tagged (`#[serde(tag = "type")]`), so a buzz
//! on the wire is simply `{"type":"buzz"}` and a join is
//! `{"type":"joinRoom","roomId":"K7QWD","username":"Alice"}`.

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, GameSettings, PlayerInfo, RoomCode, RoomSnapshot};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A command submitted by a client connection.
///
/// Commands are fire-and-forget: success shows up as a new `roomState`
/// broadcast, failure as a single notification to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open a new room with the sender as host.
    CreateRoom { username: String },

    /// Join an existing room by code.
    JoinRoom { room_id: RoomCode, username: String },

    /// Leave the room.
    LeaveRoom { room_id: RoomCode },

    /// Host only: remove another member.
    KickPlayer { target_id: ConnectionId },

    /// Host only, lobby only: replace the room's settings.
    UpdateGameSettings {
        room_id: RoomCode,
        settings: GameSettings,
    },

    /// Host only: leave the lobby and start round 1.
    StartGame { room_id: RoomCode },

    /// Host only: start the next round after a round ended.
    StartNextRound { room_id: RoomCode },

    /// Host only: destroy the room.
    EndGame { room_id: RoomCode },

    /// Host only: return a finished game to the lobby.
    ResetGame { room_id: RoomCode },

    /// Claim the current round.
    Buzz,

    /// Keep-alive. Answered with [`ServerMessage::Pong`].
    Ping { client_time: u64 },
}

impl ClientMessage {
    /// The room a command explicitly addresses, if it names one.
    pub fn room_id(&self) -> Option<&RoomCode> {
        match self {
            Self::JoinRoom { room_id, .. }
            | Self::LeaveRoom { room_id }
            | Self::UpdateGameSettings { room_id, .. }
            | Self::StartGame { room_id }
            | Self::StartNextRound { room_id }
            | Self::EndGame { room_id }
            | Self::ResetGame { room_id } => Some(room_id),
            Self::CreateRoom { .. } | Self::KickPlayer { .. } | Self::Buzz | Self::Ping { .. } => {
                None
            }
        }
    }

    /// Short command name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "createRoom",
            Self::JoinRoom { .. } => "joinRoom",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::KickPlayer { .. } => "kickPlayer",
            Self::UpdateGameSettings { .. } => "updateGameSettings",
            Self::StartGame { .. } => "startGame",
            Self::StartNextRound { .. } => "startNextRound",
            Self::EndGame { .. } => "endGame",
            Self::ResetGame { .. } => "resetGame",
            Self::Buzz => "buzz",
            Self::Ping { .. } => "ping",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Why a command failed, in a form clients can switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    RoomNotFound,
    NotAuthorized,
    RoomFull,
    RoomNotJoinable,
    InvalidSettings,
    InsufficientPlayers,
    /// The command is not valid in the room's current phase.
    InvalidPhase,
    /// Malformed frame, bad username, or a command that makes no sense
    /// for this connection.
    BadRequest,
}

/// A notification emitted to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// To the creator: your room exists.
    RoomCreated { room_id: RoomCode },

    /// To the joiner: you are in.
    RoomJoined { room_id: RoomCode },

    /// To the requester: no such room (or you are not in one).
    RoomNotFound,

    /// To the requester: only the host may do that.
    NotAuthorized { reason: String },

    /// To the requester: any other failed command.
    Error { kind: FailureKind, message: String },

    /// To everyone: the full room state.
    RoomState(RoomSnapshot),

    /// To everyone: the room no longer exists.
    RoomClosed { reason: String },

    /// To everyone, including the kicked member.
    PlayerKicked { username: String },

    CountdownStart { seconds: u32 },

    RoundStarted { round: u32, settings: GameSettings },

    /// The first accepted buzz of a round.
    BuzzerWinner { player: PlayerInfo },

    /// Every accepted buzz when `multipleBuzz` is on.
    BuzzRanked { player: PlayerInfo, rank: u32 },

    RoundEnded { round: u32, winner: Option<PlayerInfo> },

    GameOver,

    /// Buzzers are armed again (a round opened or the game reset).
    BuzzerReset,

    /// To the requester: answer to [`ClientMessage::Ping`].
    Pong { client_time: u64, server_time: u64 },
}

/// Outbound wrapper the gateway puts around every [`ServerMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-connection sequence number, starting at 1.
    pub seq: u64,
    /// Milliseconds since the connection was accepted.
    pub timestamp: u64,
    pub payload: ServerMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GamePhase, TeamId};

    fn alice() -> PlayerInfo {
        PlayerInfo {
            id: ConnectionId(2),
            username: "Alice".into(),
            is_host: false,
            team: Some(TeamId(1)),
            score: 1,
        }
    }

    #[test]
    fn test_buzz_is_a_bare_tag() {
        let json = serde_json::to_value(ClientMessage::Buzz).unwrap();
        assert_eq!(json, serde_json::json!({"type": "buzz"}));
    }

    #[test]
    fn test_join_room_json_shape() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"joinRoom","roomId":"r1abc","username":"Alice"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room_id: RoomCode::new("R1ABC"),
                username: "Alice".into(),
            }
        );
        assert_eq!(msg.room_id(), Some(&RoomCode::new("R1ABC")));
        assert_eq!(msg.name(), "joinRoom");
    }

    #[test]
    fn test_update_settings_accepts_partial_settings() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"updateGameSettings","roomId":"ABCDE","settings":{"numRounds":1}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::UpdateGameSettings { settings, .. } => {
                assert_eq!(settings.num_rounds, 1);
                assert_eq!(settings.round_duration_secs, 30);
            }
            other => panic!("expected UpdateGameSettings, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"stealPoints"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_commands_without_room_id() {
        assert_eq!(ClientMessage::Buzz.room_id(), None);
        let kick = ClientMessage::KickPlayer {
            target_id: ConnectionId(9),
        };
        assert_eq!(kick.room_id(), None);
    }

    #[test]
    fn test_room_state_flattens_snapshot() {
        let snapshot = RoomSnapshot {
            room_id: RoomCode::new("ABCDE"),
            host_id: ConnectionId(1),
            players: vec![alice()],
            game_settings: GameSettings::default(),
            game_state: GamePhase::Lobby,
            current_round: 0,
            countdown_time: 0,
            round_remaining_ms: None,
            winner: None,
            buzzes: vec![],
        };
        let json = serde_json::to_value(ServerMessage::RoomState(snapshot)).unwrap();
        assert_eq!(json["type"], "roomState");
        assert_eq!(json["roomId"], "ABCDE");
        assert_eq!(json["hostId"], 1);
        assert_eq!(json["gameState"], "LOBBY");
        assert_eq!(json["players"][0]["isHost"], false);
        assert_eq!(json["players"][0]["team"], 1);
    }

    #[test]
    fn test_round_ended_without_winner_is_null() {
        let json = serde_json::to_value(ServerMessage::RoundEnded {
            round: 2,
            winner: None,
        })
        .unwrap();
        assert_eq!(json["type"], "roundEnded");
        assert_eq!(json["round"], 2);
        assert!(json["winner"].is_null());
    }

    #[test]
    fn test_error_carries_kind() {
        let json = serde_json::to_value(ServerMessage::Error {
            kind: FailureKind::RoomFull,
            message: "room ABCDE is full".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "RoomFull");
    }

    #[test]
    fn test_buzzer_winner_json_shape() {
        let json = serde_json::to_value(ServerMessage::BuzzerWinner { player: alice() }).unwrap();
        assert_eq!(json["type"], "buzzerWinner");
        assert_eq!(json["player"]["username"], "Alice");
    }
}
