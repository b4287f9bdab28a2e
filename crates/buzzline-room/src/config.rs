//! Engine-level room configuration.
//!
//! These are operator knobs, not game rules. Game rules live in
//! [`GameSettings`] and belong to the host; `RoomConfig` belongs to
//! whoever runs the server.

use serde::{Deserialize, Serialize};

use buzzline_protocol::GameSettings;

/// Configuration shared by every room a registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Seconds between `startGame`/`startNextRound` and the round opening.
    pub countdown_secs: u32,

    /// Length of generated room codes.
    pub code_length: usize,

    /// Capacity of each room actor's command mailbox. When it fills up,
    /// senders wait (backpressure) instead of growing memory.
    pub mailbox_capacity: usize,

    /// Longest accepted username, in characters.
    pub max_username_len: usize,

    /// Settings every new room starts with.
    pub default_settings: GameSettings,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            code_length: 5,
            mailbox_capacity: 64,
            max_username_len: 24,
            default_settings: GameSettings::default(),
        }
    }
}
