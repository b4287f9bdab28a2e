//! Buzz arbitration.
//!
//! The arbiter decides which buzzes count. It runs inside the room actor,
//! so buzzes reach it one at a time in mailbox order. That order is the
//! only tie-break: two buzzes stamped with the same receive instant are
//! ranked by which one the actor dequeued first.
//!
//! In single-buzz mode the first accepted buzz closes the arbiter before
//! it returns, so no later buzz for the same round can be accepted.

use std::time::Duration;

use buzzline_protocol::ConnectionId;
use tokio::time::Instant;

/// A buzz the arbiter accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBuzz {
    pub player: ConnectionId,
    /// 1-based position in acceptance order.
    pub rank: u32,
    pub received_at: Instant,
    /// Time from the round opening to the buzz being received.
    pub reaction: Duration,
}

/// Why a buzz was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No round is accepting buzzes.
    Closed,
    /// This player already buzzed this round.
    Duplicate,
    /// The host isn't playing this game.
    HostNotPlaying,
    /// The sender isn't in the room.
    NotAMember,
}

/// The arbiter's verdict on one buzz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuzzDecision {
    Ignored(IgnoreReason),
    /// Single-buzz mode: this player won and the round must end now.
    Winner { player: ConnectionId },
    /// Multiple-buzz mode: accepted at `rank`. The round stays open.
    Ranked { player: ConnectionId, rank: u32 },
}

impl BuzzDecision {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Ignored(_))
    }
}

/// The settings the arbiter needs for one buzz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuzzRules {
    pub host_plays: bool,
    pub multiple_buzz: bool,
}

/// Per-round buzz bookkeeping.
#[derive(Debug, Default)]
pub struct BuzzArbiter {
    opened_at: Option<Instant>,
    open: bool,
    buzzes: Vec<RecordedBuzz>,
}

impl BuzzArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts accepting buzzes for a new round. Previous buzzes are
    /// discarded.
    pub fn open(&mut self, now: Instant) {
        self.opened_at = Some(now);
        self.open = true;
        self.buzzes.clear();
    }

    /// Stops accepting buzzes. Recorded buzzes stay for inspection.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Closes and forgets everything.
    pub fn clear(&mut self) {
        self.open = false;
        self.opened_at = None;
        self.buzzes.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Accepted buzzes, in rank order.
    pub fn buzzes(&self) -> &[RecordedBuzz] {
        &self.buzzes
    }

    pub fn has_buzzed(&self, player: ConnectionId) -> bool {
        self.buzzes.iter().any(|b| b.player == player)
    }

    /// Judges one buzz.
    pub fn submit(
        &mut self,
        player: ConnectionId,
        is_host: bool,
        received_at: Instant,
        rules: BuzzRules,
    ) -> BuzzDecision {
        if !self.open {
            return BuzzDecision::Ignored(IgnoreReason::Closed);
        }
        if is_host && !rules.host_plays {
            return BuzzDecision::Ignored(IgnoreReason::HostNotPlaying);
        }
        if self.has_buzzed(player) {
            return BuzzDecision::Ignored(IgnoreReason::Duplicate);
        }

        let rank = self.buzzes.len() as u32 + 1;
        let reaction = self
            .opened_at
            .map(|opened| received_at.saturating_duration_since(opened))
            .unwrap_or_default();
        self.buzzes.push(RecordedBuzz {
            player,
            rank,
            received_at,
            reaction,
        });

        if rules.multiple_buzz {
            BuzzDecision::Ranked { player, rank }
        } else {
            self.open = false;
            BuzzDecision::Winner { player }
        }
    }

    /// The earliest-ranked buzzer for whom `is_present` holds.
    pub fn winner_among(&self, is_present: impl Fn(ConnectionId) -> bool) -> Option<ConnectionId> {
        self.buzzes
            .iter()
            .map(|b| b.player)
            .find(|&player| is_present(player))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: BuzzRules = BuzzRules {
        host_plays: false,
        multiple_buzz: false,
    };
    const MULTI: BuzzRules = BuzzRules {
        host_plays: false,
        multiple_buzz: true,
    };

    #[test]
    fn test_closed_arbiter_ignores_buzz() {
        let mut arbiter = BuzzArbiter::new();
        let decision = arbiter.submit(ConnectionId(2), false, Instant::now(), SINGLE);
        assert_eq!(decision, BuzzDecision::Ignored(IgnoreReason::Closed));
        assert!(arbiter.buzzes().is_empty());
    }

    #[test]
    fn test_first_buzz_wins_and_closes() {
        let mut arbiter = BuzzArbiter::new();
        let now = Instant::now();
        arbiter.open(now);

        let first = arbiter.submit(ConnectionId(2), false, now, SINGLE);
        let second = arbiter.submit(ConnectionId(3), false, now, SINGLE);

        assert_eq!(first, BuzzDecision::Winner { player: ConnectionId(2) });
        assert_eq!(second, BuzzDecision::Ignored(IgnoreReason::Closed));
        assert!(!arbiter.is_open());
        assert_eq!(arbiter.buzzes().len(), 1);
    }

    #[test]
    fn test_non_playing_host_ignored() {
        let mut arbiter = BuzzArbiter::new();
        arbiter.open(Instant::now());
        let decision = arbiter.submit(ConnectionId(1), true, Instant::now(), SINGLE);
        assert_eq!(decision, BuzzDecision::Ignored(IgnoreReason::HostNotPlaying));
        assert!(arbiter.is_open());

        let rules = BuzzRules {
            host_plays: true,
            ..SINGLE
        };
        assert!(arbiter.submit(ConnectionId(1), true, Instant::now(), rules).is_accepted());
    }

    #[test]
    fn test_multiple_mode_ranks_in_submission_order() {
        let mut arbiter = BuzzArbiter::new();
        let now = Instant::now();
        arbiter.open(now);

        assert_eq!(
            arbiter.submit(ConnectionId(3), false, now, MULTI),
            BuzzDecision::Ranked { player: ConnectionId(3), rank: 1 }
        );
        assert_eq!(
            arbiter.submit(ConnectionId(2), false, now, MULTI),
            BuzzDecision::Ranked { player: ConnectionId(2), rank: 2 }
        );
        assert_eq!(
            arbiter.submit(ConnectionId(3), false, now, MULTI),
            BuzzDecision::Ignored(IgnoreReason::Duplicate)
        );
        assert!(arbiter.is_open());
    }

    #[test]
    fn test_reaction_measured_from_open() {
        let mut arbiter = BuzzArbiter::new();
        let opened = Instant::now();
        arbiter.open(opened);
        arbiter.submit(ConnectionId(2), false, opened + Duration::from_millis(420), SINGLE);
        assert_eq!(arbiter.buzzes()[0].reaction, Duration::from_millis(420));
    }

    #[test]
    fn test_winner_skips_departed_players() {
        let mut arbiter = BuzzArbiter::new();
        let now = Instant::now();
        arbiter.open(now);
        arbiter.submit(ConnectionId(2), false, now, MULTI);
        arbiter.submit(ConnectionId(3), false, now, MULTI);

        assert_eq!(arbiter.winner_among(|_| true), Some(ConnectionId(2)));
        assert_eq!(
            arbiter.winner_among(|id| id != ConnectionId(2)),
            Some(ConnectionId(3))
        );
        assert_eq!(arbiter.winner_among(|_| false), None);
    }

    #[test]
    fn test_open_discards_previous_round() {
        let mut arbiter = BuzzArbiter::new();
        arbiter.open(Instant::now());
        arbiter.submit(ConnectionId(2), false, Instant::now(), SINGLE);
        arbiter.open(Instant::now());
        assert!(arbiter.buzzes().is_empty());
        assert!(arbiter.submit(ConnectionId(2), false, Instant::now(), SINGLE).is_accepted());
    }
}
