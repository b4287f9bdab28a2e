//! Integration tests for the Buzzline server, handler, and full connection flow.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use buzzline::prelude::*;
use buzzline::SHUTDOWN_REASON;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =========================================================================
// Helpers
// =========================================================================

fn fast_rooms() -> RoomConfig {
    RoomConfig {
        countdown_secs: 0,
        ..RoomConfig::default()
    }
}

/// Starts a server on an OS-assigned port and returns its address and
/// registry.
async fn start_server() -> (SocketAddr, Arc<RoomRegistry>) {
    let server = BuzzlineServer::builder()
        .bind("127.0.0.1:0")
        .room_config(fast_rooms())
        .build()
        .await
        .expect("server should bind");
    let addr = server.local_addr().expect("bound address");
    let registry = server.registry();

    tokio::spawn(server.run());
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, registry)
}

async fn connect(addr: SocketAddr) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");
    ws
}

async fn send(ws: &mut ClientWs, command: Value) {
    ws.send(Message::Text(command.to_string().into()))
        .await
        .expect("send should succeed");
}

/// Next envelope from the server, skipping control frames.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("server should answer within 5s")
            .expect("stream should be open")
            .expect("frame should be valid");
        if msg.is_text() || msg.is_binary() {
            return serde_json::from_slice(&msg.into_data()).expect("frame should be JSON");
        }
    }
}

/// Skips envelopes until one carries a payload of type `kind`.
async fn recv_type(ws: &mut ClientWs, kind: &str) -> Value {
    loop {
        let envelope = recv(ws).await;
        if envelope["payload"]["type"] == kind {
            return envelope;
        }
    }
}

/// Creates a room as "Host" and returns the room code.
async fn create_room(ws: &mut ClientWs) -> String {
    send(ws, json!({"type": "createRoom", "username": "Host"})).await;
    let created = recv_type(ws, "roomCreated").await;
    recv_type(ws, "roomState").await;
    created["payload"]["roomId"]
        .as_str()
        .expect("roomId should be a string")
        .to_owned()
}

/// Joins `code` and returns this member's connection id.
async fn join_room(ws: &mut ClientWs, code: &str, username: &str) -> u64 {
    send(
        ws,
        json!({"type": "joinRoom", "roomId": code, "username": username}),
    )
    .await;
    recv_type(ws, "roomJoined").await;
    let state = recv_type(ws, "roomState").await;
    state["payload"]["players"]
        .as_array()
        .expect("players should be an array")
        .iter()
        .find(|p| p["username"] == username)
        .and_then(|p| p["id"].as_u64())
        .expect("joiner should be listed")
}

// =========================================================================
// Framing
// =========================================================================

#[tokio::test]
async fn test_create_room_sends_created_then_state() {
    let (addr, registry) = start_server().await;
    let mut host = connect(addr).await;

    send(&mut host, json!({"type": "createRoom", "username": "Host"})).await;

    let first = recv(&mut host).await;
    assert_eq!(first["seq"], 1);
    assert_eq!(first["payload"]["type"], "roomCreated");
    let code = first["payload"]["roomId"].as_str().unwrap().to_owned();
    assert_eq!(code.len(), 5);

    let second = recv(&mut host).await;
    assert_eq!(second["seq"], 2);
    assert!(second["timestamp"].as_u64() >= first["timestamp"].as_u64());
    let state = &second["payload"];
    assert_eq!(state["type"], "roomState");
    assert_eq!(state["roomId"], code.as_str());
    assert_eq!(state["gameState"], "LOBBY");
    assert_eq!(state["players"][0]["username"], "Host");
    assert_eq!(state["players"][0]["isHost"], true);
    assert_eq!(state["hostId"], state["players"][0]["id"]);

    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("this is not json".into())).await.unwrap();
    let error = recv(&mut ws).await;
    assert_eq!(error["payload"]["type"], "error");
    assert_eq!(error["payload"]["kind"], "BadRequest");

    send(&mut ws, json!({"type": "stealPoints"})).await;
    let error = recv(&mut ws).await;
    assert_eq!(error["payload"]["kind"], "BadRequest");

    send(&mut ws, json!({"type": "ping", "clientTime": 42})).await;
    let pong = recv(&mut ws).await;
    assert_eq!(pong["seq"], 3);
    assert_eq!(pong["payload"]["type"], "pong");
    assert_eq!(pong["payload"]["clientTime"], 42);
    assert!(pong["payload"]["serverTime"].as_u64().unwrap() > 0);
}

// =========================================================================
// Commands
// =========================================================================

#[tokio::test]
async fn test_join_with_lowercase_code_notifies_everyone() {
    let (addr, registry) = start_server().await;
    let mut host = connect(addr).await;
    let mut alice = connect(addr).await;

    let code = create_room(&mut host).await;
    let alice_id = join_room(&mut alice, &code.to_lowercase(), "Alice").await;

    let state = recv_type(&mut host, "roomState").await;
    let players = state["payload"]["players"].as_array().unwrap();
    assert_eq!(players.len(), 2);
    assert_eq!(players[1]["id"], alice_id);
    assert_eq!(players[1]["isHost"], false);

    let room = registry.room_of(ConnectionId(alice_id)).await;
    assert_eq!(room, Some(RoomCode::new(&code)));
}

#[tokio::test]
async fn test_unknown_room_is_reported() {
    let (addr, _) = start_server().await;
    let mut ws = connect(addr).await;

    send(
        &mut ws,
        json!({"type": "joinRoom", "roomId": "ZZZZZ", "username": "Alice"}),
    )
    .await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["payload"]["type"], "roomNotFound");

    send(&mut ws, json!({"type": "buzz"})).await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["payload"]["type"], "roomNotFound");
}

#[tokio::test]
async fn test_only_the_host_can_start() {
    let (addr, _) = start_server().await;
    let mut host = connect(addr).await;
    let mut alice = connect(addr).await;

    let code = create_room(&mut host).await;
    join_room(&mut alice, &code, "Alice").await;

    send(&mut alice, json!({"type": "startGame", "roomId": code})).await;
    let reply = recv_type(&mut alice, "notAuthorized").await;
    assert!(reply["payload"]["reason"].as_str().unwrap().contains("host"));
}

#[tokio::test]
async fn test_full_round_over_the_wire() {
    let (addr, _) = start_server().await;
    let mut host = connect(addr).await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    let code = create_room(&mut host).await;
    let alice_id = join_room(&mut alice, &code, "Alice").await;
    join_room(&mut bob, &code, "Bob").await;

    send(
        &mut host,
        json!({"type": "updateGameSettings", "roomId": code, "settings": {"numRounds": 1}}),
    )
    .await;
    let state = recv_type(&mut alice, "roomState").await;
    // The join of Bob arrives first; wait for the settings broadcast.
    let state = if state["payload"]["gameSettings"]["numRounds"] == 1 {
        state
    } else {
        recv_type(&mut alice, "roomState").await
    };
    assert_eq!(state["payload"]["gameSettings"]["numRounds"], 1);

    send(&mut host, json!({"type": "startGame", "roomId": code})).await;
    let started = recv_type(&mut alice, "roundStarted").await;
    assert_eq!(started["payload"]["round"], 1);

    send(&mut alice, json!({"type": "buzz"})).await;
    let winner = recv_type(&mut bob, "buzzerWinner").await;
    assert_eq!(winner["payload"]["player"]["id"], alice_id);
    assert_eq!(winner["payload"]["player"]["username"], "Alice");

    let ended = recv_type(&mut host, "roundEnded").await;
    assert_eq!(ended["payload"]["round"], 1);
    assert_eq!(ended["payload"]["winner"]["username"], "Alice");

    recv_type(&mut alice, "gameOver").await;
    let final_state = recv_type(&mut alice, "roomState").await;
    assert_eq!(final_state["payload"]["gameState"], "GAME_OVER");
    let alice_entry = final_state["payload"]["players"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == alice_id)
        .cloned()
        .unwrap();
    assert_eq!(alice_entry["score"], 1);

    // A late buzz is ignored silently; the connection still answers pings.
    send(&mut bob, json!({"type": "buzz"})).await;
    send(&mut bob, json!({"type": "ping", "clientTime": 7})).await;
    let pong = recv_type(&mut bob, "pong").await;
    assert_eq!(pong["payload"]["clientTime"], 7);
}

// =========================================================================
// Leaving and shutdown
// =========================================================================

#[tokio::test]
async fn test_disconnect_promotes_next_member() {
    let (addr, registry) = start_server().await;
    let mut host = connect(addr).await;
    let mut alice = connect(addr).await;

    let code = create_room(&mut host).await;
    let alice_id = join_room(&mut alice, &code, "Alice").await;

    host.close(None).await.unwrap();

    let state = loop {
        let state = recv_type(&mut alice, "roomState").await;
        if state["payload"]["players"].as_array().unwrap().len() == 1 {
            break state;
        }
    };
    assert_eq!(state["payload"]["hostId"], alice_id);
    assert_eq!(state["payload"]["players"][0]["isHost"], true);
    assert_eq!(registry.room_count().await, 1);
}

#[tokio::test]
async fn test_end_game_closes_room_for_everyone() {
    let (addr, registry) = start_server().await;
    let mut host = connect(addr).await;
    let mut alice = connect(addr).await;

    let code = create_room(&mut host).await;
    join_room(&mut alice, &code, "Alice").await;

    send(&mut host, json!({"type": "endGame", "roomId": code})).await;
    let closed = recv_type(&mut alice, "roomClosed").await;
    assert_eq!(closed["payload"]["reason"], "host ended the game");
    recv_type(&mut host, "roomClosed").await;

    assert_eq!(registry.room_count().await, 0);

    send(
        &mut alice,
        json!({"type": "joinRoom", "roomId": code, "username": "Alice"}),
    )
    .await;
    recv_type(&mut alice, "roomNotFound").await;
}

#[tokio::test]
async fn test_shutdown_closes_every_room() {
    let server = BuzzlineServer::builder()
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should bind");
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let mut host = connect(addr).await;
    create_room(&mut host).await;
    assert_eq!(registry.room_count().await, 1);

    stop_tx.send(()).unwrap();
    let closed = recv_type(&mut host, "roomClosed").await;
    assert_eq!(closed["payload"]["reason"], SHUTDOWN_REASON);

    running
        .await
        .expect("server task should not panic")
        .expect("server should stop cleanly");
    assert_eq!(registry.room_count().await, 0);
}
