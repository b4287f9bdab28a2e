//! Phase deadlines for Buzzline room actors.
//!
//! A room only ever waits on one thing at a time: the countdown's next
//! second, the round closing, or the rest period ending. [`PhaseTimer`]
//! models exactly that: a single deadline stamped with the round
//! generation that armed it.
//!
//! # Integration
//!
//! The timer sits next to the mailbox in the room actor's `select!` loop,
//! so an expiry is handled on the same task, in the same order, as player
//! commands:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         biased;
//!         Some(cmd) = mailbox.recv() => { /* join, buzz, ... */ }
//!         expiry = timer.wait_for_expiry() => {
//!             if expiry.generation == round.generation() {
//!                 /* advance the state machine */
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! # Disarmed timers
//!
//! With no deadline armed, [`PhaseTimer::wait_for_expiry`] pends forever,
//! which `select!` treats as "this branch never fires".

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// A fired deadline, returned by [`PhaseTimer::wait_for_expiry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    /// The generation passed to [`PhaseTimer::arm`].
    pub generation: u64,
    /// When the deadline was due.
    pub deadline: Instant,
    /// How late the owning task observed it.
    pub late_by: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: Instant,
    generation: u64,
}

/// A single re-armable deadline.
///
/// Arming replaces whatever was armed before; there is never more than
/// one pending expiry per timer.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    armed: Option<Armed>,
    fired: u64,
}

impl PhaseTimer {
    /// Creates a disarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer to fire `after` from now for `generation`.
    pub fn arm(&mut self, after: Duration, generation: u64) {
        self.arm_at(Instant::now() + after, generation);
    }

    /// Arms the timer for an absolute deadline.
    pub fn arm_at(&mut self, deadline: Instant, generation: u64) {
        if let Some(prev) = self.armed {
            trace!(
                replaced_generation = prev.generation,
                generation,
                "phase timer re-armed"
            );
        }
        self.armed = Some(Armed {
            deadline,
            generation,
        });
    }

    /// Cancels the pending deadline. Returns `true` if one was armed.
    pub fn disarm(&mut self) -> bool {
        match self.armed.take() {
            Some(prev) => {
                trace!(generation = prev.generation, "phase timer disarmed");
                true
            }
            None => false,
        }
    }

    /// Whether a deadline is pending.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// The pending deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.map(|a| a.deadline)
    }

    /// The generation of the pending deadline, if any.
    pub fn armed_generation(&self) -> Option<u64> {
        self.armed.map(|a| a.generation)
    }

    /// Time left until the pending deadline (zero if already due).
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of expiries delivered so far.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    /// Waits for the pending deadline and disarms the timer.
    ///
    /// Cancel-safe: dropping the future before it completes (because
    /// another `select!` branch won) leaves the deadline armed.
    pub async fn wait_for_expiry(&mut self) -> Expiry {
        let Some(armed) = self.armed else {
            std::future::pending::<()>().await;
            unreachable!("pending() never resolves");
        };

        time::sleep_until(armed.deadline).await;

        let late_by = Instant::now().saturating_duration_since(armed.deadline);
        self.armed = None;
        self.fired += 1;
        debug!(
            generation = armed.generation,
            late_ms = late_by.as_secs_f64() * 1000.0,
            "phase timer expired"
        );

        Expiry {
            generation: armed.generation,
            deadline: armed.deadline,
            late_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_timer_is_disarmed() {
        let t = PhaseTimer::new();
        assert!(!t.is_armed());
        assert_eq!(t.deadline(), None);
        assert_eq!(t.remaining(), None);
        assert_eq!(t.fired_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_reports_whether_armed() {
        let mut t = PhaseTimer::new();
        assert!(!t.disarm());
        t.arm(Duration::from_secs(1), 4);
        assert_eq!(t.armed_generation(), Some(4));
        assert!(t.disarm());
        assert!(!t.is_armed());
    }
}
