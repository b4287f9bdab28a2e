//! Room actor: an isolated Tokio task that owns one room.
//!
//! Every mutation of a room happens on its actor task, one command at a
//! time. Phase deadlines are delivered to the same task through a
//! [`PhaseTimer`] raced against the mailbox in a `select!` loop, so a
//! timer firing and a buzz arriving are serialized like any two commands.
//!
//! Outbound notifications go straight from the actor to each member's
//! unbounded channel. The actor never blocks on a slow client.

use std::collections::HashMap;
use std::time::Duration;

use buzzline_protocol::{
    BuzzEntry, ConnectionId, GamePhase, GameSettings, PlayerInfo, RoomCode, RoomSnapshot,
    ServerMessage,
};
use buzzline_timer::{Expiry, PhaseTimer};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::arbiter::{BuzzArbiter, BuzzDecision, BuzzRules, IgnoreReason};
use crate::players::PlayerRegistry;
use crate::round::{CountdownStep, RoundMachine};
use crate::{settings, RoomConfig, RoomError};

/// Channel sender for delivering notifications to one member.
pub type MemberSender = mpsc::UnboundedSender<ServerMessage>;

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Commands sent to a room actor through its mailbox.
pub(crate) enum RoomCommand {
    Join {
        id: ConnectionId,
        username: String,
        sender: MemberSender,
        reply: Reply<()>,
    },
    Leave {
        id: ConnectionId,
        reply: Reply<Presence>,
    },
    Kick {
        requester: ConnectionId,
        target: ConnectionId,
        reply: Reply<PlayerInfo>,
    },
    UpdateSettings {
        requester: ConnectionId,
        settings: GameSettings,
        reply: Reply<()>,
    },
    StartGame {
        requester: ConnectionId,
        reply: Reply<()>,
    },
    StartNextRound {
        requester: ConnectionId,
        reply: Reply<()>,
    },
    ResetGame {
        requester: ConnectionId,
        reply: Reply<()>,
    },
    /// Destroy the room. `requester` is `None` for server-initiated closes.
    Close {
        requester: Option<ConnectionId>,
        reason: String,
        reply: Reply<Vec<ConnectionId>>,
    },
    Buzz {
        id: ConnectionId,
        received_at: Instant,
        reply: Reply<BuzzDecision>,
    },
    Snapshot {
        reply: Reply<RoomSnapshot>,
    },
}

/// Who is left after a member leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub remaining: usize,
    /// The new host, if the departing member was host.
    pub promoted: Option<ConnectionId>,
}

/// Handle to a running room actor.
///
/// Cheap to clone: it's an `mpsc::Sender` plus the room code. Every
/// method fails with [`RoomError::Unavailable`] once the actor has
/// stopped.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Whether the actor behind this handle has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Whether both handles talk to the same actor.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> RoomCommand) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?
    }

    pub async fn join(
        &self,
        id: ConnectionId,
        username: String,
        sender: MemberSender,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Join {
            id,
            username,
            sender,
            reply,
        })
        .await
    }

    pub async fn leave(&self, id: ConnectionId) -> Result<Presence, RoomError> {
        self.request(|reply| RoomCommand::Leave { id, reply }).await
    }

    pub async fn kick(
        &self,
        requester: ConnectionId,
        target: ConnectionId,
    ) -> Result<PlayerInfo, RoomError> {
        self.request(|reply| RoomCommand::Kick {
            requester,
            target,
            reply,
        })
        .await
    }

    pub async fn update_settings(
        &self,
        requester: ConnectionId,
        settings: GameSettings,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::UpdateSettings {
            requester,
            settings,
            reply,
        })
        .await
    }

    pub async fn start_game(&self, requester: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartGame { requester, reply })
            .await
    }

    pub async fn start_next_round(&self, requester: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartNextRound { requester, reply })
            .await
    }

    pub async fn reset_game(&self, requester: ConnectionId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::ResetGame { requester, reply })
            .await
    }

    /// Closes the room, telling every member why. Returns the members
    /// that were in it.
    pub async fn close(
        &self,
        requester: Option<ConnectionId>,
        reason: impl Into<String>,
    ) -> Result<Vec<ConnectionId>, RoomError> {
        let reason = reason.into();
        self.request(|reply| RoomCommand::Close {
            requester,
            reason,
            reply,
        })
        .await
    }

    /// Submits a buzz stamped with the instant the gateway received it.
    pub async fn buzz(
        &self,
        id: ConnectionId,
        received_at: Instant,
    ) -> Result<BuzzDecision, RoomError> {
        self.request(|reply| RoomCommand::Buzz {
            id,
            received_at,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }
}

enum Flow {
    Continue,
    Stop,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    code: RoomCode,
    config: RoomConfig,
    settings: GameSettings,
    players: PlayerRegistry,
    senders: HashMap<ConnectionId, MemberSender>,
    round: RoundMachine,
    arbiter: BuzzArbiter,
    timer: PhaseTimer,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until the room closes, empties, or every
    /// handle is dropped.
    async fn run(mut self) {
        let host = self.players.host();
        tracing::info!(room_id = %self.code, %host, "room actor started");

        self.send_to(
            host,
            ServerMessage::RoomCreated {
                room_id: self.code.clone(),
            },
        );
        self.broadcast_state();

        loop {
            let flow = tokio::select! {
                biased;
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => Flow::Stop,
                },
                expiry = self.timer.wait_for_expiry() => {
                    self.handle_expiry(expiry);
                    Flow::Continue
                }
            };
            if let Flow::Stop = flow {
                break;
            }
        }

        tracing::info!(room_id = %self.code, "room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join {
                id,
                username,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_join(id, username, sender));
            }
            RoomCommand::Leave { id, reply } => {
                let result = self.handle_leave(id);
                let emptied = matches!(&result, Ok(p) if p.remaining == 0);
                let _ = reply.send(result);
                if emptied {
                    tracing::info!(room_id = %self.code, "last member left");
                    return Flow::Stop;
                }
            }
            RoomCommand::Kick {
                requester,
                target,
                reply,
            } => {
                let _ = reply.send(self.handle_kick(requester, target));
            }
            RoomCommand::UpdateSettings {
                requester,
                settings,
                reply,
            } => {
                let _ = reply.send(self.handle_update_settings(requester, settings));
            }
            RoomCommand::StartGame { requester, reply } => {
                let _ = reply.send(self.handle_start_game(requester));
            }
            RoomCommand::StartNextRound { requester, reply } => {
                let _ = reply.send(self.handle_start_next_round(requester));
            }
            RoomCommand::ResetGame { requester, reply } => {
                let _ = reply.send(self.handle_reset(requester));
            }
            RoomCommand::Close {
                requester,
                reason,
                reply,
            } => match self.handle_close(requester, &reason) {
                Ok(members) => {
                    let _ = reply.send(Ok(members));
                    return Flow::Stop;
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            RoomCommand::Buzz {
                id,
                received_at,
                reply,
            } => {
                let _ = reply.send(Ok(self.handle_buzz(id, received_at)));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
        }
        Flow::Continue
    }

    // ---------------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------------

    fn handle_join(
        &mut self,
        id: ConnectionId,
        username: String,
        sender: MemberSender,
    ) -> Result<(), RoomError> {
        let phase = self.round.phase();
        if !phase.is_joinable() {
            return Err(RoomError::NotJoinable(self.code.clone(), phase));
        }

        let max_players = usize::try_from(self.settings.max_players).unwrap_or(0);
        self.players.join(id, username, max_players)?;
        self.senders.insert(id, sender);

        tracing::info!(
            room_id = %self.code,
            player = %id,
            players = self.players.len(),
            "player joined"
        );

        self.send_to(
            id,
            ServerMessage::RoomJoined {
                room_id: self.code.clone(),
            },
        );
        self.broadcast_state();
        Ok(())
    }

    fn handle_leave(&mut self, id: ConnectionId) -> Result<Presence, RoomError> {
        let departure = self.players.leave(id)?;
        self.senders.remove(&id);

        tracing::info!(
            room_id = %self.code,
            player = %id,
            players = departure.remaining,
            "player left"
        );
        if let Some(host) = departure.promoted {
            tracing::info!(room_id = %self.code, %host, "host promoted");
        }

        if departure.remaining > 0 {
            self.after_departure();
        }

        Ok(Presence {
            remaining: departure.remaining,
            promoted: departure.promoted,
        })
    }

    fn handle_kick(
        &mut self,
        requester: ConnectionId,
        target: ConnectionId,
    ) -> Result<PlayerInfo, RoomError> {
        let kicked = self.players.kick(requester, target)?;

        let notice = ServerMessage::PlayerKicked {
            username: kicked.username.clone(),
        };
        self.broadcast(notice.clone());
        self.send_to(target, notice);
        self.senders.remove(&target);

        tracing::info!(
            room_id = %self.code,
            player = %target,
            username = %kicked.username,
            "player kicked"
        );

        self.after_departure();
        Ok(kicked)
    }

    /// A member is gone: the round may now be complete, and everyone
    /// needs the new roster.
    fn after_departure(&mut self) {
        if !self.maybe_advance() {
            self.broadcast_state();
        }
    }

    fn handle_close(
        &mut self,
        requester: Option<ConnectionId>,
        reason: &str,
    ) -> Result<Vec<ConnectionId>, RoomError> {
        if let Some(requester) = requester {
            self.players.require_host(requester, "end the game")?;
        }

        self.timer.disarm();
        self.arbiter.clear();
        let members: Vec<ConnectionId> = self.players.iter().map(|p| p.id).collect();
        self.broadcast(ServerMessage::RoomClosed {
            reason: reason.to_owned(),
        });
        self.senders.clear();

        tracing::info!(room_id = %self.code, %reason, "room closed");
        Ok(members)
    }

    // ---------------------------------------------------------------------
    // Host controls
    // ---------------------------------------------------------------------

    fn handle_update_settings(
        &mut self,
        requester: ConnectionId,
        proposed: GameSettings,
    ) -> Result<(), RoomError> {
        self.players.require_host(requester, "change settings")?;
        let phase = self.round.phase();
        if phase != GamePhase::Lobby {
            return Err(RoomError::InvalidPhase {
                action: "change settings",
                phase,
            });
        }
        settings::validate(&proposed, self.players.len())?;

        self.settings = proposed;
        tracing::info!(room_id = %self.code, settings = ?self.settings, "settings updated");
        self.broadcast_state();
        Ok(())
    }

    fn handle_start_game(&mut self, requester: ConnectionId) -> Result<(), RoomError> {
        self.players.require_host(requester, "start the game")?;
        let phase = self.round.phase();
        if phase != GamePhase::Lobby {
            return Err(RoomError::InvalidPhase {
                action: "start the game",
                phase,
            });
        }

        let host_plays = self.settings.host_plays;
        let required = if host_plays { 1 } else { 2 };
        let present = self.players.len();
        if present < required {
            return Err(RoomError::InsufficientPlayers { required, present });
        }

        settings::check_team_capacity(&self.settings, self.players.participant_count(host_plays))?;
        if self.settings.teams_enabled {
            let num_teams = u32::try_from(self.settings.num_teams).unwrap_or(1);
            self.players.assign_teams(num_teams, host_plays);
        }

        let round = self.round.start_game(self.config.countdown_secs)?;
        tracing::info!(
            room_id = %self.code,
            round,
            players = present,
            rounds = self.settings.rounds(),
            "game started"
        );
        self.enter_countdown();
        Ok(())
    }

    fn handle_start_next_round(&mut self, requester: ConnectionId) -> Result<(), RoomError> {
        self.players.require_host(requester, "start the next round")?;
        let round = self
            .round
            .start_next_round(self.config.countdown_secs, self.settings.rounds())?;
        tracing::info!(room_id = %self.code, round, "next round started by host");
        self.enter_countdown();
        Ok(())
    }

    fn handle_reset(&mut self, requester: ConnectionId) -> Result<(), RoomError> {
        self.players.require_host(requester, "reset the game")?;
        self.round.reset()?;
        self.timer.disarm();
        self.arbiter.clear();
        self.players.reset_progress();

        tracing::info!(room_id = %self.code, "game reset to lobby");
        self.broadcast(ServerMessage::BuzzerReset);
        self.broadcast_state();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Rounds
    // ---------------------------------------------------------------------

    /// The machine just entered COUNTDOWN: announce it and start ticking.
    fn enter_countdown(&mut self) {
        self.arbiter.clear();
        let seconds = self.round.countdown_remaining();
        self.broadcast(ServerMessage::CountdownStart { seconds });

        if seconds == 0 {
            self.open_round();
            return;
        }
        self.timer.arm(COUNTDOWN_STEP, self.round.generation());
        self.broadcast_state();
    }

    fn open_round(&mut self) {
        let now = Instant::now();
        let deadline = match self.round.open_round(now, self.settings.round_duration()) {
            Ok(deadline) => deadline,
            Err(err) => {
                tracing::warn!(room_id = %self.code, %err, "could not open round");
                return;
            }
        };
        self.arbiter.open(now);
        self.timer.arm_at(deadline, self.round.generation());

        let round = self.round.current_round();
        tracing::info!(room_id = %self.code, round, "round opened");
        self.broadcast(ServerMessage::BuzzerReset);
        self.broadcast(ServerMessage::RoundStarted {
            round,
            settings: self.settings.clone(),
        });
        self.broadcast_state();
    }

    /// ACTIVE_ROUND → ROUND_END, then GAME_OVER if that was the last
    /// round, otherwise arm the rest timer when rounds advance on their own.
    fn close_round(&mut self) {
        if self.round.phase() != GamePhase::ActiveRound {
            return;
        }
        self.arbiter.close();
        self.timer.disarm();

        // A member promoted to host mid-round stops being a participant
        // when the host doesn't play.
        let players = &self.players;
        let host_plays = self.settings.host_plays;
        let winner_id = self
            .arbiter
            .winner_among(|id| players.contains(id) && (host_plays || !players.is_host(id)));
        let winner = winner_id.and_then(|id| self.players.award(id).cloned());
        let round = self.round.current_round();

        if let Err(err) = self.round.end_round(winner.clone()) {
            tracing::warn!(room_id = %self.code, %err, "could not end round");
            return;
        }
        tracing::info!(
            room_id = %self.code,
            round,
            winner = ?winner.as_ref().map(|p| p.id),
            "round ended"
        );
        self.broadcast(ServerMessage::RoundEnded { round, winner });
        self.broadcast_state();

        if self.round.is_final_round(self.settings.rounds()) {
            if let Err(err) = self.round.finish() {
                tracing::warn!(room_id = %self.code, %err, "could not finish game");
                return;
            }
            tracing::info!(room_id = %self.code, rounds = round, "game over");
            self.broadcast(ServerMessage::GameOver);
            self.broadcast_state();
        } else if !self.settings.host_starts_next_round {
            self.timer
                .arm(self.settings.rest_time(), self.round.generation());
        }
    }

    /// In advance mode, ends the round once every present participant
    /// has buzzed. Returns whether the round was closed.
    fn maybe_advance(&mut self) -> bool {
        if self.round.phase() != GamePhase::ActiveRound || !self.settings.advance_mode {
            return false;
        }
        let pending: Vec<ConnectionId> = self
            .players
            .participants(self.settings.host_plays)
            .map(|p| p.id)
            .filter(|&id| !self.arbiter.has_buzzed(id))
            .collect();
        if pending.is_empty() && !self.arbiter.buzzes().is_empty() {
            tracing::debug!(room_id = %self.code, "every participant buzzed");
            self.close_round();
            return true;
        }
        false
    }

    fn handle_buzz(&mut self, id: ConnectionId, received_at: Instant) -> BuzzDecision {
        let Some(is_host) = self.players.get(id).map(|p| p.is_host) else {
            return BuzzDecision::Ignored(IgnoreReason::NotAMember);
        };
        if self
            .round
            .round_deadline()
            .is_some_and(|deadline| received_at >= deadline)
        {
            tracing::debug!(room_id = %self.code, player = %id, "buzz after round deadline");
            self.close_round();
            return BuzzDecision::Ignored(IgnoreReason::Closed);
        }
        let rules = BuzzRules {
            host_plays: self.settings.host_plays,
            multiple_buzz: self.settings.multiple_buzz,
        };

        let decision = self.arbiter.submit(id, is_host, received_at, rules);
        match decision {
            BuzzDecision::Ignored(reason) => {
                tracing::debug!(room_id = %self.code, player = %id, ?reason, "buzz ignored");
            }
            BuzzDecision::Winner { player } => {
                tracing::info!(room_id = %self.code, %player, "buzzer winner");
                if let Some(info) = self.players.get(player).cloned() {
                    self.broadcast(ServerMessage::BuzzerWinner { player: info });
                }
                self.close_round();
            }
            BuzzDecision::Ranked { player, rank } => {
                tracing::debug!(room_id = %self.code, %player, rank, "buzz ranked");
                if let Some(info) = self.players.get(player).cloned() {
                    if rank == 1 {
                        self.broadcast(ServerMessage::BuzzerWinner {
                            player: info.clone(),
                        });
                    }
                    self.broadcast(ServerMessage::BuzzRanked { player: info, rank });
                }
                if !self.maybe_advance() {
                    self.broadcast_state();
                }
            }
        }
        decision
    }

    fn handle_expiry(&mut self, expiry: Expiry) {
        if expiry.generation != self.round.generation() {
            tracing::debug!(
                room_id = %self.code,
                expired = expiry.generation,
                current = self.round.generation(),
                "stale timer ignored"
            );
            return;
        }

        match self.round.phase() {
            GamePhase::Countdown => match self.round.tick_countdown() {
                CountdownStep::Remaining(_) => {
                    self.timer
                        .arm_at(expiry.deadline + COUNTDOWN_STEP, self.round.generation());
                    self.broadcast_state();
                }
                CountdownStep::Elapsed => self.open_round(),
            },
            GamePhase::ActiveRound => {
                tracing::debug!(room_id = %self.code, "round timed out");
                self.close_round();
            }
            GamePhase::RoundEnd => {
                match self
                    .round
                    .start_next_round(self.config.countdown_secs, self.settings.rounds())
                {
                    Ok(round) => {
                        tracing::info!(room_id = %self.code, round, "rest over, next round");
                        self.enter_countdown();
                    }
                    Err(err) => {
                        tracing::warn!(room_id = %self.code, %err, "could not start next round");
                    }
                }
            }
            GamePhase::Lobby | GamePhase::GameOver => {}
        }
    }

    // ---------------------------------------------------------------------
    // Fan-out
    // ---------------------------------------------------------------------

    fn snapshot(&self) -> RoomSnapshot {
        let now = Instant::now();
        let buzzes = self
            .arbiter
            .buzzes()
            .iter()
            .filter_map(|b| {
                let player = self.players.get(b.player)?;
                Some(BuzzEntry {
                    player: b.player,
                    username: player.username.clone(),
                    rank: b.rank,
                    reaction_ms: b.reaction.as_millis() as u64,
                })
            })
            .collect();

        RoomSnapshot {
            room_id: self.code.clone(),
            host_id: self.players.host(),
            players: self.players.infos(),
            game_settings: self.settings.clone(),
            game_state: self.round.phase(),
            current_round: self.round.current_round(),
            countdown_time: self.round.countdown_remaining(),
            round_remaining_ms: self
                .round
                .round_deadline()
                .map(|deadline| deadline.saturating_duration_since(now).as_millis() as u64),
            winner: self.round.last_winner().cloned(),
            buzzes,
        }
    }

    fn broadcast_state(&self) {
        self.broadcast(ServerMessage::RoomState(self.snapshot()));
    }

    /// Sends a message to every member, in tenure order.
    fn broadcast(&self, msg: ServerMessage) {
        for player in self.players.iter() {
            self.send_to(player.id, msg.clone());
        }
    }

    /// Sends a message to a single member. Silently drops if the member's
    /// connection is gone; its disconnect will arrive as a leave.
    fn send_to(&self, id: ConnectionId, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&id) {
            if sender.send(msg).is_err() {
                tracing::trace!(room_id = %self.code, player = %id, "member channel closed");
            }
        }
    }
}

/// Spawns a room actor with `host` as its first member and returns a
/// handle to it.
pub(crate) fn spawn_room(
    code: RoomCode,
    config: RoomConfig,
    host: ConnectionId,
    username: String,
    sender: MemberSender,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));

    let mut senders = HashMap::new();
    senders.insert(host, sender);

    let actor = RoomActor {
        code: code.clone(),
        settings: config.default_settings.clone(),
        players: PlayerRegistry::new(code.clone(), host, username),
        senders,
        round: RoundMachine::new(),
        arbiter: BuzzArbiter::new(),
        timer: PhaseTimer::new(),
        receiver: rx,
        config,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
