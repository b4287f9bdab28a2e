//! Per-connection handler: upgrade, command routing, and outbound framing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade the TCP stream to a WebSocket
//!   2. Spawn a writer task that drains the connection's outbound queue
//!   3. Loop: receive frames → decode → dispatch to the room registry
//!   4. On exit, remove the connection from its room

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use buzzline_protocol::{
    ClientMessage, Codec, ConnectionId, Envelope, FailureKind, ServerMessage,
};
use buzzline_room::{MemberSender, RoomError};
use buzzline_transport::{PendingConnection, WsWriter};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::BuzzlineError;

/// Drop guard that removes the connection from its room when the handler
/// exits, including when it panics. `Drop` is synchronous, so the
/// registry call runs on a fire-and-forget task.
struct MembershipGuard<C: Codec> {
    conn_id: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for MembershipGuard<C> {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let registry = Arc::clone(&self.state.registry);
        tokio::spawn(async move {
            registry.disconnect(conn_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    pending: PendingConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), BuzzlineError> {
    let peer = pending.peer_addr();
    let conn = pending.upgrade().await?;
    let conn_id = conn.id();
    let start = Instant::now();
    tracing::debug!(%conn_id, %peer, "connection upgraded");

    let (mut reader, writer) = conn.split();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(writer, rx, Arc::clone(&state), start));

    let _guard = MembershipGuard {
        conn_id,
        state: Arc::clone(&state),
    };

    loop {
        let data = match tokio::time::timeout(state.idle_timeout, reader.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection timed out");
                break;
            }
        };
        let received_at = tokio::time::Instant::now();

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode command");
                send_error(&tx, FailureKind::BadRequest, format!("malformed message: {e}"));
                continue;
            }
        };

        dispatch(&state, conn_id, msg, received_at, &tx).await;
    }

    // _guard drops here → the connection leaves its room. The writer task
    // ends once the room has dropped its copy of the sender.
    Ok(())
}

/// Routes one decoded command. Failures go back to this connection only.
async fn dispatch<C: Codec>(
    state: &ServerState<C>,
    conn_id: ConnectionId,
    msg: ClientMessage,
    received_at: tokio::time::Instant,
    tx: &MemberSender,
) {
    let registry = &state.registry;
    let command = msg.name();

    let result: Result<(), RoomError> = match msg {
        ClientMessage::CreateRoom { username } => registry
            .create_room(conn_id, &username, tx.clone())
            .await
            .map(|_| ()),
        ClientMessage::JoinRoom { room_id, username } => {
            registry
                .join_room(&room_id, conn_id, &username, tx.clone())
                .await
        }
        ClientMessage::LeaveRoom { room_id } => registry.leave_room(conn_id, Some(&room_id)).await,
        ClientMessage::KickPlayer { target_id } => registry.kick_player(conn_id, target_id).await,
        ClientMessage::UpdateGameSettings { room_id, settings } => {
            registry.update_settings(conn_id, &room_id, settings).await
        }
        ClientMessage::StartGame { room_id } => registry.start_game(conn_id, &room_id).await,
        ClientMessage::StartNextRound { room_id } => {
            registry.start_next_round(conn_id, &room_id).await
        }
        ClientMessage::EndGame { room_id } => registry.end_game(conn_id, &room_id).await,
        ClientMessage::ResetGame { room_id } => registry.reset_game(conn_id, &room_id).await,
        ClientMessage::Buzz => registry
            .buzz(conn_id, received_at)
            .await
            .map(|decision| tracing::trace!(%conn_id, ?decision, "buzz handled")),
        ClientMessage::Ping { client_time } => {
            let _ = tx.send(ServerMessage::Pong {
                client_time,
                server_time: unix_millis(),
            });
            Ok(())
        }
    };

    if let Err(err) = result {
        tracing::debug!(%conn_id, command, error = %err, "command rejected");
        let _ = tx.send(err.to_notification());
    }
}

/// Drains the outbound queue, wrapping each notification in an
/// [`Envelope`] with this connection's next sequence number.
async fn write_loop<C: Codec>(
    mut writer: WsWriter,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    state: Arc<ServerState<C>>,
    start: Instant,
) {
    let conn_id = writer.id();
    let mut seq: u64 = 0;

    while let Some(payload) = rx.recv().await {
        let envelope = Envelope {
            seq: next_seq(&mut seq),
            timestamp: start.elapsed().as_millis() as u64,
            payload,
        };
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode notification");
                continue;
            }
        };
        let sent = match String::from_utf8(bytes) {
            Ok(text) => writer.send_text(text).await,
            Err(e) => writer.send(e.as_bytes()).await,
        };
        if let Err(e) = sent {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
            return;
        }
    }

    let _ = writer.close().await;
}

/// Queues an `error` notification for this connection.
fn send_error(tx: &MemberSender, kind: FailureKind, message: String) {
    let _ = tx.send(ServerMessage::Error { kind, message });
}

/// Returns the current sequence number and increments it.
fn next_seq(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
