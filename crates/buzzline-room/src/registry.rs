//! Room registry: creates rooms, tracks them by code, and routes each
//! connection's commands to the room it belongs to.
//!
//! The registry owns two indexes under one async mutex: room code →
//! [`RoomHandle`], and connection → room code. The lock is only ever held
//! for map lookups and updates, never while waiting on a room actor, so a
//! slow room cannot stall commands for other rooms.

use std::collections::HashMap;

use buzzline_protocol::{ConnectionId, GameSettings, RoomCode, RoomSnapshot};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::arbiter::BuzzDecision;
use crate::players::validate_username;
use crate::room::{spawn_room, MemberSender, RoomHandle};
use crate::{RoomConfig, RoomError};

/// Characters room codes are drawn from. Look-alikes (`I`, `O`, `0`, `1`)
/// are left out so codes survive being read aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Reason given to members when the host ends the game.
pub const HOST_ENDED_REASON: &str = "host ended the game";

/// Generates a random room code of `length` characters.
pub fn generate_code(length: usize) -> RoomCode {
    let mut rng = rand::rng();
    let code: String = (0..length)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    RoomCode::new(code)
}

#[derive(Default)]
struct Indexes {
    rooms: HashMap<RoomCode, RoomHandle>,
    /// A connection is in at most one room.
    memberships: HashMap<ConnectionId, RoomCode>,
}

impl Indexes {
    /// Drops `handle`'s room and every membership pointing at it, unless
    /// the code has since been reused by another room.
    fn remove_room(&mut self, handle: &RoomHandle) {
        let code = handle.code();
        let registered = self
            .rooms
            .get(code)
            .is_some_and(|current| current.same_room(handle));
        if !registered {
            return;
        }
        self.rooms.remove(code);
        self.memberships.retain(|_, room| room != code);
        tracing::info!(room_id = %code, rooms = self.rooms.len(), "room removed");
    }

    fn forget_member(&mut self, id: ConnectionId, code: &RoomCode) {
        if self.memberships.get(&id) == Some(code) {
            self.memberships.remove(&id);
        }
    }
}

/// Tracks every live room.
///
/// Shared between connection handlers as `Arc<RoomRegistry>`; all methods
/// take `&self`.
pub struct RoomRegistry {
    config: RoomConfig,
    indexes: Mutex<Indexes>,
}

impl RoomRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            indexes: Mutex::new(Indexes::default()),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Creates a room with `host` as its first member and host.
    ///
    /// The room sends `roomCreated` and the first `roomState` to `sender`
    /// itself, before any other command can reach it.
    pub async fn create_room(
        &self,
        host: ConnectionId,
        username: &str,
        sender: MemberSender,
    ) -> Result<RoomCode, RoomError> {
        let username = validate_username(username, self.config.max_username_len)?;

        let mut indexes = self.indexes.lock().await;
        if let Some(current) = indexes.memberships.get(&host) {
            return Err(RoomError::AlreadyInRoom(host, current.clone()));
        }

        let code = loop {
            let candidate = generate_code(self.config.code_length);
            if !indexes.rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let handle = spawn_room(code.clone(), self.config.clone(), host, username, sender);
        indexes.rooms.insert(code.clone(), handle);
        indexes.memberships.insert(host, code.clone());

        tracing::info!(room_id = %code, %host, rooms = indexes.rooms.len(), "room created");
        Ok(code)
    }

    /// Adds a connection to an existing room.
    pub async fn join_room(
        &self,
        code: &RoomCode,
        id: ConnectionId,
        username: &str,
        sender: MemberSender,
    ) -> Result<(), RoomError> {
        let username = validate_username(username, self.config.max_username_len)?;

        let handle = {
            let indexes = self.indexes.lock().await;
            if let Some(current) = indexes.memberships.get(&id) {
                return Err(RoomError::AlreadyInRoom(id, current.clone()));
            }
            indexes
                .rooms
                .get(code)
                .cloned()
                .ok_or_else(|| RoomError::NotFound(code.clone()))?
        };

        let result = handle.join(id, username, sender).await;

        let mut indexes = self.indexes.lock().await;
        match result {
            Ok(()) => {
                let registered = indexes
                    .rooms
                    .get(code)
                    .is_some_and(|current| current.same_room(&handle));
                if registered {
                    indexes.memberships.insert(id, code.clone());
                }
                Ok(())
            }
            Err(RoomError::Unavailable(code)) => {
                indexes.remove_room(&handle);
                Err(RoomError::NotFound(code))
            }
            Err(err) => Err(err),
        }
    }

    /// Returns a handle to the room with this code.
    pub async fn get_room(&self, code: &RoomCode) -> Result<RoomHandle, RoomError> {
        self.indexes
            .lock()
            .await
            .rooms
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    /// Current state of the room with this code.
    pub async fn snapshot(&self, code: &RoomCode) -> Result<RoomSnapshot, RoomError> {
        let handle = self.get_room(code).await?;
        let result = handle.snapshot().await;
        self.settle(&handle, result).await
    }

    /// Removes a connection from its room. A room left empty is destroyed.
    ///
    /// `addressed` is the room the client named, if any; it must match the
    /// connection's actual room.
    pub async fn leave_room(
        &self,
        id: ConnectionId,
        addressed: Option<&RoomCode>,
    ) -> Result<(), RoomError> {
        let handle = self.resolve(id, addressed).await?;
        let result = handle.leave(id).await;

        let mut indexes = self.indexes.lock().await;
        indexes.forget_member(id, handle.code());
        match result {
            Ok(presence) => {
                if presence.remaining == 0 {
                    indexes.remove_room(&handle);
                }
                Ok(())
            }
            Err(RoomError::Unavailable(code)) => {
                indexes.remove_room(&handle);
                Err(RoomError::NotFound(code))
            }
            Err(err) => Err(err),
        }
    }

    /// Transport-level disconnect. Same as leaving, minus the error when
    /// the connection wasn't in a room.
    pub async fn disconnect(&self, id: ConnectionId) {
        match self.leave_room(id, None).await {
            Ok(()) => tracing::debug!(conn_id = %id, "disconnected member removed"),
            Err(RoomError::NoRoom(_)) => {}
            Err(err) => tracing::debug!(conn_id = %id, %err, "disconnect cleanup"),
        }
    }

    /// Host removes `target` from the host's room.
    pub async fn kick_player(
        &self,
        requester: ConnectionId,
        target: ConnectionId,
    ) -> Result<(), RoomError> {
        let handle = self.resolve(requester, None).await?;
        let result = handle.kick(requester, target).await;

        let mut indexes = self.indexes.lock().await;
        match result {
            Ok(_) => {
                indexes.forget_member(target, handle.code());
                Ok(())
            }
            Err(RoomError::Unavailable(code)) => {
                indexes.remove_room(&handle);
                Err(RoomError::NotFound(code))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn update_settings(
        &self,
        requester: ConnectionId,
        code: &RoomCode,
        settings: GameSettings,
    ) -> Result<(), RoomError> {
        let handle = self.resolve(requester, Some(code)).await?;
        let result = handle.update_settings(requester, settings).await;
        self.settle(&handle, result).await
    }

    pub async fn start_game(&self, requester: ConnectionId, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self.resolve(requester, Some(code)).await?;
        let result = handle.start_game(requester).await;
        self.settle(&handle, result).await
    }

    pub async fn start_next_round(
        &self,
        requester: ConnectionId,
        code: &RoomCode,
    ) -> Result<(), RoomError> {
        let handle = self.resolve(requester, Some(code)).await?;
        let result = handle.start_next_round(requester).await;
        self.settle(&handle, result).await
    }

    pub async fn reset_game(&self, requester: ConnectionId, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self.resolve(requester, Some(code)).await?;
        let result = handle.reset_game(requester).await;
        self.settle(&handle, result).await
    }

    /// Host closes the room: it is destroyed and every member is told.
    ///
    /// Fails with `NotAuthorized` unless `requester` is the room's host.
    pub async fn close_room(&self, requester: ConnectionId, code: &RoomCode) -> Result<(), RoomError> {
        let handle = self.resolve(requester, Some(code)).await?;
        self.close(handle, Some(requester), HOST_ENDED_REASON).await
    }

    /// Host ends the game. Same as [`close_room`](Self::close_room).
    pub async fn end_game(&self, requester: ConnectionId, code: &RoomCode) -> Result<(), RoomError> {
        self.close_room(requester, code).await
    }

    /// Operator-only: destroys a room without any requester or host check.
    /// Never reachable from a client command; used for server shutdown.
    pub async fn shutdown_room(&self, code: &RoomCode, reason: &str) -> Result<(), RoomError> {
        let handle = self.get_room(code).await?;
        self.close(handle, None, reason).await
    }

    /// Closes every room.
    pub async fn close_all(&self, reason: &str) {
        let handles: Vec<RoomHandle> = self.indexes.lock().await.rooms.values().cloned().collect();
        for handle in handles {
            if let Err(err) = self.close(handle, None, reason).await {
                tracing::debug!(%err, "room already gone during close_all");
            }
        }
    }

    /// Routes a buzz to the sender's room.
    pub async fn buzz(
        &self,
        id: ConnectionId,
        received_at: Instant,
    ) -> Result<BuzzDecision, RoomError> {
        let handle = self.resolve(id, None).await?;
        let result = handle.buzz(id, received_at).await;
        self.settle(&handle, result).await
    }

    /// The room a connection is in, if any.
    pub async fn room_of(&self, id: ConnectionId) -> Option<RoomCode> {
        self.indexes.lock().await.memberships.get(&id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.indexes.lock().await.rooms.len()
    }

    pub async fn room_codes(&self) -> Vec<RoomCode> {
        self.indexes.lock().await.rooms.keys().cloned().collect()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Finds the room a connection's command should go to.
    ///
    /// A connection may only address its own room. Naming a different
    /// room that exists is an authorization failure; naming one that
    /// doesn't exist is `NotFound`.
    async fn resolve(
        &self,
        id: ConnectionId,
        addressed: Option<&RoomCode>,
    ) -> Result<RoomHandle, RoomError> {
        let indexes = self.indexes.lock().await;
        let current = indexes.memberships.get(&id);

        let code = match (current, addressed) {
            (Some(current), Some(code)) if current == code => current,
            (Some(current), None) => current,
            (_, Some(code)) => {
                return Err(if indexes.rooms.contains_key(code) {
                    RoomError::NotAuthorized(format!("not a member of room {code}"))
                } else {
                    RoomError::NotFound(code.clone())
                });
            }
            (None, None) => return Err(RoomError::NoRoom(id)),
        };

        indexes
            .rooms
            .get(code)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(code.clone()))
    }

    async fn close(
        &self,
        handle: RoomHandle,
        requester: Option<ConnectionId>,
        reason: &str,
    ) -> Result<(), RoomError> {
        let result = handle.close(requester, reason).await;

        let mut indexes = self.indexes.lock().await;
        match result {
            Ok(members) => {
                indexes.remove_room(&handle);
                tracing::info!(room_id = %handle.code(), members = members.len(), %reason, "room destroyed");
                Ok(())
            }
            Err(RoomError::Unavailable(code)) => {
                indexes.remove_room(&handle);
                Err(RoomError::NotFound(code))
            }
            Err(err) => Err(err),
        }
    }

    /// Maps a stopped actor to `NotFound` and cleans up after it.
    async fn settle<T>(&self, handle: &RoomHandle, result: Result<T, RoomError>) -> Result<T, RoomError> {
        match result {
            Err(RoomError::Unavailable(code)) => {
                self.indexes.lock().await.remove_room(handle);
                Err(RoomError::NotFound(code))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_uses_alphabet() {
        for _ in 0..100 {
            let code = generate_code(5);
            assert_eq!(code.as_str().len(), 5);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_alphabet_has_no_lookalikes() {
        for c in [b'I', b'O', b'0', b'1'] {
            assert!(!CODE_ALPHABET.contains(&c));
        }
    }

    #[tokio::test]
    async fn test_create_room_rejects_blank_username() {
        let registry = RoomRegistry::new(RoomConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = registry.create_room(ConnectionId(1), "   ", tx).await.unwrap_err();
        assert!(matches!(err, RoomError::InvalidUsername(_)));
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_without_membership() {
        let registry = RoomRegistry::new(RoomConfig::default());
        let err = registry
            .buzz(ConnectionId(7), Instant::now())
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NoRoom(ConnectionId(7)));

        let code = RoomCode::new("ZZZZZ");
        let err = registry.start_game(ConnectionId(7), &code).await.unwrap_err();
        assert_eq!(err, RoomError::NotFound(code));
    }
}
