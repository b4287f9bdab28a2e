//! The game phase state machine.
//!
//! ```text
//!   LOBBY ──startGame──▶ COUNTDOWN ──elapsed──▶ ACTIVE_ROUND
//!     ▲                      ▲                       │
//!     │                      │                buzz / timeout
//!   resetGame          startNextRound                ▼
//!     │                      └─────────────────  ROUND_END
//!   GAME_OVER ◀──────────── final round ─────────────┘
//! ```
//!
//! Every transition bumps the generation. Timers are armed with the
//! generation current at arming time, so a deadline from an earlier
//! phase can be recognised and dropped.

use std::time::Duration;

use buzzline_protocol::{GamePhase, PlayerInfo};
use tokio::time::Instant;

use crate::RoomError;

/// Result of one countdown second elapsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStep {
    /// Still counting; this many seconds remain.
    Remaining(u32),
    /// The countdown reached zero.
    Elapsed,
}

#[derive(Debug)]
pub struct RoundMachine {
    phase: GamePhase,
    generation: u64,
    current_round: u32,
    countdown_remaining: u32,
    round_deadline: Option<Instant>,
    last_winner: Option<PlayerInfo>,
}

impl Default for RoundMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundMachine {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::Lobby,
            generation: 0,
            current_round: 0,
            countdown_remaining: 0,
            round_deadline: None,
            last_winner: None,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 1-based round number; 0 before the first round.
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    /// Seconds left on the countdown; 0 outside `COUNTDOWN`.
    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    /// When the active round times out.
    pub fn round_deadline(&self) -> Option<Instant> {
        self.round_deadline
    }

    /// Winner of the most recent round, if it had one.
    pub fn last_winner(&self) -> Option<&PlayerInfo> {
        self.last_winner.as_ref()
    }

    /// Whether the current round is the last one.
    pub fn is_final_round(&self, num_rounds: u32) -> bool {
        self.current_round >= num_rounds
    }

    /// LOBBY → COUNTDOWN for round 1.
    pub fn start_game(&mut self, countdown_secs: u32) -> Result<u32, RoomError> {
        self.require_phase(GamePhase::Lobby, "start the game")?;
        self.current_round = 0;
        Ok(self.begin_countdown(countdown_secs))
    }

    /// ROUND_END → COUNTDOWN for the next round.
    pub fn start_next_round(&mut self, countdown_secs: u32, num_rounds: u32) -> Result<u32, RoomError> {
        self.require_phase(GamePhase::RoundEnd, "start the next round")?;
        if self.is_final_round(num_rounds) {
            return Err(RoomError::InvalidPhase {
                action: "start another round after the final one",
                phase: self.phase,
            });
        }
        Ok(self.begin_countdown(countdown_secs))
    }

    /// One countdown second has passed.
    pub fn tick_countdown(&mut self) -> CountdownStep {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining == 0 {
            CountdownStep::Elapsed
        } else {
            CountdownStep::Remaining(self.countdown_remaining)
        }
    }

    /// COUNTDOWN → ACTIVE_ROUND. The round closes at `now + duration`.
    pub fn open_round(&mut self, now: Instant, duration: Duration) -> Result<Instant, RoomError> {
        self.require_phase(GamePhase::Countdown, "open a round")?;
        self.transition(GamePhase::ActiveRound);
        let deadline = now + duration;
        self.round_deadline = Some(deadline);
        Ok(deadline)
    }

    /// ACTIVE_ROUND → ROUND_END.
    pub fn end_round(&mut self, winner: Option<PlayerInfo>) -> Result<(), RoomError> {
        self.require_phase(GamePhase::ActiveRound, "end a round")?;
        self.transition(GamePhase::RoundEnd);
        self.last_winner = winner;
        Ok(())
    }

    /// ROUND_END → GAME_OVER.
    pub fn finish(&mut self) -> Result<(), RoomError> {
        self.require_phase(GamePhase::RoundEnd, "finish the game")?;
        self.transition(GamePhase::GameOver);
        Ok(())
    }

    /// GAME_OVER → LOBBY. The round counter starts over.
    pub fn reset(&mut self) -> Result<(), RoomError> {
        self.require_phase(GamePhase::GameOver, "reset the game")?;
        self.transition(GamePhase::Lobby);
        self.current_round = 0;
        self.last_winner = None;
        Ok(())
    }

    fn begin_countdown(&mut self, countdown_secs: u32) -> u32 {
        self.transition(GamePhase::Countdown);
        self.current_round += 1;
        self.countdown_remaining = countdown_secs;
        self.last_winner = None;
        self.current_round
    }

    fn require_phase(&self, phase: GamePhase, action: &'static str) -> Result<(), RoomError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(RoomError::InvalidPhase {
                action,
                phase: self.phase,
            })
        }
    }

    fn transition(&mut self, next: GamePhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "illegal transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
        self.generation += 1;
        if next != GamePhase::Countdown {
            self.countdown_remaining = 0;
        }
        if next != GamePhase::ActiveRound {
            self.round_deadline = None;
        }
    }
}
