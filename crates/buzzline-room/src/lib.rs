//! Room engine for Buzzline.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! roster, settings, round state machine, and buzz arbiter. Everything a
//! room does happens on that task, one command at a time.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, routes each connection to its room
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoundMachine`]: LOBBY → COUNTDOWN → ACTIVE_ROUND → ROUND_END → GAME_OVER
//! - [`BuzzArbiter`]: decides which buzzes count and in what order
//! - [`PlayerRegistry`]: members, host, teams, scores
//! - [`RoomConfig`]: operator-level knobs shared by every room

mod arbiter;
mod config;
mod error;
mod players;
mod registry;
mod room;
mod round;
pub mod settings;

pub use arbiter::{BuzzArbiter, BuzzDecision, BuzzRules, IgnoreReason, RecordedBuzz};
pub use config::RoomConfig;
pub use error::RoomError;
pub use players::{validate_username, Departure, PlayerRegistry};
pub use registry::{generate_code, RoomRegistry, CODE_ALPHABET, HOST_ENDED_REASON};
pub use room::{MemberSender, Presence, RoomHandle};
pub use round::{CountdownStep, RoundMachine};
