//! Room membership: who is in, who hosts, who plays on which team.
//!
//! The roster is kept in join order. That order is the tenure order used
//! for host promotion and team assignment, and it is the order snapshots
//! list players in.

use buzzline_protocol::{ConnectionId, PlayerInfo, RoomCode, TeamId};

use crate::RoomError;

/// Trims and checks a requested username.
pub fn validate_username(raw: &str, max_len: usize) -> Result<String, RoomError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RoomError::InvalidUsername("username must not be empty".into()));
    }
    let len = name.chars().count();
    if len > max_len {
        return Err(RoomError::InvalidUsername(format!(
            "username is {len} characters, the limit is {max_len}"
        )));
    }
    Ok(name.to_owned())
}

/// The outcome of a member leaving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: PlayerInfo,
    /// Set when the departing member was host and someone took over.
    pub promoted: Option<ConnectionId>,
    pub remaining: usize,
}

/// The members of one room.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    room: RoomCode,
    players: Vec<PlayerInfo>,
    host: ConnectionId,
}

impl PlayerRegistry {
    /// Creates a roster whose only member is the host.
    pub fn new(room: RoomCode, host: ConnectionId, username: String) -> Self {
        Self {
            room,
            players: vec![PlayerInfo {
                id: host,
                username,
                is_host: true,
                team: None,
                score: 0,
            }],
            host,
        }
    }

    pub fn host(&self) -> ConnectionId {
        self.host
    }

    pub fn is_host(&self, id: ConnectionId) -> bool {
        self.host == id
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Members in tenure order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerInfo> {
        self.players.iter()
    }

    /// Members who compete for rounds: everyone, minus the host unless
    /// the host plays.
    pub fn participants(&self, host_plays: bool) -> impl Iterator<Item = &PlayerInfo> {
        let host = self.host;
        self.players
            .iter()
            .filter(move |p| host_plays || p.id != host)
    }

    pub fn participant_count(&self, host_plays: bool) -> usize {
        self.participants(host_plays).count()
    }

    /// Fails with `NotAuthorized` unless `requester` is the host.
    pub fn require_host(&self, requester: ConnectionId, action: &str) -> Result<(), RoomError> {
        if self.is_host(requester) {
            Ok(())
        } else {
            Err(RoomError::NotAuthorized(format!("only the host can {action}")))
        }
    }

    /// Adds a member at the end of the tenure order.
    pub fn join(
        &mut self,
        id: ConnectionId,
        username: String,
        max_players: usize,
    ) -> Result<(), RoomError> {
        if self.contains(id) {
            return Err(RoomError::AlreadyInRoom(id, self.room.clone()));
        }
        if self.players.len() >= max_players {
            return Err(RoomError::RoomFull(self.room.clone()));
        }
        self.players.push(PlayerInfo {
            id,
            username,
            is_host: false,
            team: None,
            score: 0,
        });
        Ok(())
    }

    /// Removes a member. If the host leaves and anyone remains, the
    /// longest-tenured remaining member becomes host.
    pub fn leave(&mut self, id: ConnectionId) -> Result<Departure, RoomError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or(RoomError::NotInRoom(id))?;
        let player = self.players.remove(index);

        let mut promoted = None;
        if player.id == self.host {
            if let Some(next) = self.players.first_mut() {
                next.is_host = true;
                self.host = next.id;
                promoted = Some(next.id);
            }
        }

        Ok(Departure {
            player,
            promoted,
            remaining: self.players.len(),
        })
    }

    /// Host removes another member.
    pub fn kick(
        &mut self,
        requester: ConnectionId,
        target: ConnectionId,
    ) -> Result<PlayerInfo, RoomError> {
        self.require_host(requester, "kick players")?;
        if target == requester {
            return Err(RoomError::NotAuthorized("the host cannot kick themselves".into()));
        }
        let departure = self.leave(target)?;
        Ok(departure.player)
    }

    /// Spreads participants over `num_teams` teams round-robin, in tenure
    /// order. Non-participants (a non-playing host) get no team.
    pub fn assign_teams(&mut self, num_teams: u32, host_plays: bool) {
        let num_teams = num_teams.max(1);
        let host = self.host;
        let mut slot = 0u32;
        for player in &mut self.players {
            if !host_plays && player.id == host {
                player.team = None;
                continue;
            }
            player.team = Some(TeamId(slot % num_teams + 1));
            slot += 1;
        }
    }

    /// Adds one point to `id`'s score. Returns the updated member.
    pub fn award(&mut self, id: ConnectionId) -> Option<&PlayerInfo> {
        let player = self.players.iter_mut().find(|p| p.id == id)?;
        player.score += 1;
        Some(player)
    }

    /// Clears teams and scores for a fresh game.
    pub fn reset_progress(&mut self) {
        for player in &mut self.players {
            player.team = None;
            player.score = 0;
        }
    }

    /// Owned copies of every member, for snapshots.
    pub fn infos(&self) -> Vec<PlayerInfo> {
        self.players.clone()
    }
}
