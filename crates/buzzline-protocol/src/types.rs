//! Core data types shared by the engine and its clients.
//!
//! Everything here is plain data: identifiers, the room's configurable
//! rules, and the snapshot a room broadcasts after every state change.
//! JSON field names are camelCase because the browser client reads them
//! directly.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one client connection, and therefore one player.
///
/// There are no accounts: a player *is* their connection. The gateway
/// assigns these when a socket is accepted and they are never reused
/// within a process.
///
/// `#[serde(transparent)]` keeps it a plain number on the wire:
/// `ConnectionId(42)` is `42`, not `{"0":42}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A short, human-typeable room code such as `"K7QWD"`.
///
/// Codes are stored upper case with surrounding whitespace removed, so
/// `" k7qwd"` typed on a phone finds the same room. Normalisation also
/// runs on deserialization (`#[serde(from = "String")]`), which means a
/// `RoomCode` value can never hold a non-normalised code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Creates a code from user input, normalising it.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the normalised code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomCode {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A team number, starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// GameSettings
// ---------------------------------------------------------------------------

/// The host-configurable rules of a room.
///
/// Numeric fields are signed on purpose: a client that submits
/// `"numRounds": -1` should get a descriptive `InvalidSettings` failure
/// from the validator, not an opaque decode error. Durations are whole
/// seconds.
///
/// `#[serde(default)]` lets a client omit fields; anything missing takes
/// the value from [`GameSettings::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameSettings {
    /// Maximum number of members, host included.
    pub max_players: i64,
    /// Seconds a round stays open for buzzing.
    #[serde(rename = "roundDuration")]
    pub round_duration_secs: i64,
    /// Rounds in one game.
    pub num_rounds: i64,
    /// Whether the host competes (may buzz) or only moderates.
    pub host_plays: bool,
    /// End a round early once every eligible participant has buzzed.
    pub advance_mode: bool,
    /// Keep the round open after the first buzz and rank every buzz.
    pub multiple_buzz: bool,
    /// Split participants into teams when the game starts.
    pub teams_enabled: bool,
    /// Maximum participants per team.
    pub team_size: i64,
    /// Number of teams.
    pub num_teams: i64,
    /// Wait for the host between rounds instead of advancing on a timer.
    pub host_starts_next_round: bool,
    /// Seconds of rest before the next round when advancing on a timer.
    #[serde(rename = "restTimeBetweenRounds")]
    pub rest_time_secs: i64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_players: 10,
            round_duration_secs: 30,
            num_rounds: 5,
            host_plays: false,
            advance_mode: false,
            multiple_buzz: false,
            teams_enabled: false,
            team_size: 2,
            num_teams: 2,
            host_starts_next_round: true,
            rest_time_secs: 5,
        }
    }
}

impl GameSettings {
    /// The round length as a [`Duration`]. Negative values clamp to zero;
    /// validated settings never contain them.
    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(self.round_duration_secs.max(0) as u64)
    }

    /// The rest period between rounds as a [`Duration`].
    pub fn rest_time(&self) -> Duration {
        Duration::from_secs(self.rest_time_secs.max(0) as u64)
    }

    /// The number of rounds as an unsigned count.
    pub fn rounds(&self) -> u32 {
        self.num_rounds.clamp(0, i64::from(u32::MAX)) as u32
    }
}

// ---------------------------------------------------------------------------
// GamePhase
// ---------------------------------------------------------------------------

/// Where a room is in its game.
///
/// ```text
/// Lobby → Countdown → ActiveRound → RoundEnd ─┬→ Countdown (next round)
///   ↑                                         └→ GameOver
///   └──────────────────── reset ────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    Lobby,
    Countdown,
    ActiveRound,
    RoundEnd,
    GameOver,
}

impl GamePhase {
    /// Only the lobby accepts new members.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns `true` if moving from `self` to `target` is a legal edge
    /// of the round state machine.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Countdown)
                | (Self::Countdown, Self::ActiveRound)
                | (Self::ActiveRound, Self::RoundEnd)
                | (Self::RoundEnd, Self::Countdown)
                | (Self::RoundEnd, Self::GameOver)
                | (Self::GameOver, Self::Lobby)
        )
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lobby => "LOBBY",
            Self::Countdown => "COUNTDOWN",
            Self::ActiveRound => "ACTIVE_ROUND",
            Self::RoundEnd => "ROUND_END",
            Self::GameOver => "GAME_OVER",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Public view of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: ConnectionId,
    pub username: String,
    pub is_host: bool,
    pub team: Option<TeamId>,
    /// Rounds won in the current game.
    pub score: u32,
}

/// One accepted buzz in the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzEntry {
    pub player: ConnectionId,
    pub username: String,
    /// 1 for the first accepted buzz, 2 for the next, ...
    pub rank: u32,
    /// Milliseconds between the round opening and the server receiving
    /// the buzz.
    pub reaction_ms: u64,
}

/// Everything a client needs to draw a room, with no history required.
///
/// Rooms broadcast one of these after every state change. Point events
/// (`buzzerWinner`, `gameOver`, ...) only trigger animations; the
/// snapshot is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomCode,
    pub host_id: ConnectionId,
    /// Members in join order.
    pub players: Vec<PlayerInfo>,
    pub game_settings: GameSettings,
    pub game_state: GamePhase,
    /// 0 in the lobby, then 1-based.
    pub current_round: u32,
    /// Seconds left in the countdown; 0 outside `COUNTDOWN`.
    pub countdown_time: u32,
    /// Milliseconds until the round closes; only set in `ACTIVE_ROUND`.
    pub round_remaining_ms: Option<u64>,
    /// The winner of the most recent round, if it had one.
    pub winner: Option<PlayerInfo>,
    /// Accepted buzzes of the current (or just finished) round.
    pub buzzes: Vec<BuzzEntry>,
}

impl RoomSnapshot {
    /// Looks up a member by connection.
    pub fn player(&self, id: ConnectionId) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ConnectionId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(ConnectionId(42).to_string(), "conn-42");
    }

    #[test]
    fn test_room_code_normalises_input() {
        assert_eq!(RoomCode::new("  k7qwd ").as_str(), "K7QWD");
    }

    #[test]
    fn test_room_code_normalises_on_deserialize() {
        let code: RoomCode = serde_json::from_str("\"abc12\"").unwrap();
        assert_eq!(code, RoomCode::new("ABC12"));
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"ABC12\"");
    }

    #[test]
    fn test_settings_use_client_field_names() {
        let json = serde_json::to_value(GameSettings::default()).unwrap();
        assert_eq!(json["maxPlayers"], 10);
        assert_eq!(json["roundDuration"], 30);
        assert_eq!(json["restTimeBetweenRounds"], 5);
        assert_eq!(json["hostStartsNextRound"], true);
    }

    #[test]
    fn test_settings_missing_fields_take_defaults() {
        let s: GameSettings =
            serde_json::from_str(r#"{"numRounds": 3, "multipleBuzz": true}"#).unwrap();
        assert_eq!(s.num_rounds, 3);
        assert!(s.multiple_buzz);
        assert_eq!(s.max_players, GameSettings::default().max_players);
    }

    #[test]
    fn test_settings_accept_negative_numbers_for_validation() {
        let s: GameSettings = serde_json::from_str(r#"{"numRounds": -2}"#).unwrap();
        assert_eq!(s.num_rounds, -2);
        assert_eq!(s.rounds(), 0);
    }

    #[test]
    fn test_phase_wire_names() {
        let json = serde_json::to_string(&GamePhase::ActiveRound).unwrap();
        assert_eq!(json, "\"ACTIVE_ROUND\"");
        assert_eq!(GamePhase::RoundEnd.to_string(), "ROUND_END");
    }

    #[test]
    fn test_phase_transition_table() {
        assert!(GamePhase::Lobby.can_transition_to(GamePhase::Countdown));
        assert!(GamePhase::RoundEnd.can_transition_to(GamePhase::Countdown));
        assert!(GamePhase::RoundEnd.can_transition_to(GamePhase::GameOver));
        assert!(GamePhase::GameOver.can_transition_to(GamePhase::Lobby));
        assert!(!GamePhase::Lobby.can_transition_to(GamePhase::ActiveRound));
        assert!(!GamePhase::ActiveRound.can_transition_to(GamePhase::Countdown));
        assert!(!GamePhase::GameOver.can_transition_to(GamePhase::Countdown));
    }

    #[test]
    fn test_only_lobby_is_joinable() {
        assert!(GamePhase::Lobby.is_joinable());
        assert!(!GamePhase::Countdown.is_joinable());
        assert!(!GamePhase::GameOver.is_joinable());
    }
}
