//! Per-connection WebSocket handling: the protocol state machine.
//!
//! Each connection gets one serial task. Its inbound frames are processed
//! strictly in order, which is what preserves per-client room-mutation
//! ordering and what makes the handshake's async reputation lookup safe:
//! frames arriving during the lookup stay queued on the transport and are
//! replayed afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use warp::ws::WebSocket;

use crate::constants::CLOSE_GENERIC_ERROR;
use crate::core::connection::Connection;
use crate::core::message::{encode_set_batch, parse_client_message, ClientMessage};
use crate::core::rate_limiter::RateLimiter;
use crate::core::room::Room;
use crate::core::state::SharedState;
use crate::core::validation::{
    is_valid_room_id, is_valid_username_str, is_valid_variable_value_str,
};
use crate::error::{NimbusError, Result};
use crate::security::{is_generated, parse_username};

/// Handle one WebSocket connection from accept to cleanup.
pub async fn handle_ws_client(ws: WebSocket, addr: String, state: SharedState) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<warp::ws::Message>();

    // Forward outbound messages from the connection's channel to the
    // socket. A close frame ends the forwarder, dropping the sink and with
    // it the transport.
    tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if ws_tx.send(message).await.is_err() {
                break;
            }
            if closing {
                break;
            }
        }
    });

    let conn = Arc::new(Connection::new(addr, tx));
    let mut rate_limiter = RateLimiter::new(
        state.config.rate_limit_operations,
        state.config.rate_limit_window,
    );

    state.supervisor.register(Arc::clone(&conn)).await;
    info!("Connection opened: {}", conn.label());

    loop {
        let result = tokio::select! {
            result = ws_rx.next() => result,
            // A server-side close (heartbeat timeout, error teardown) must
            // wake this loop even when the peer has gone completely silent.
            _ = conn.closed() => break,
        };
        let message = match result {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                debug!("Transport error for {}: {}", conn.label(), e);
                break;
            }
            None => break,
        };

        if message.is_pong() {
            conn.mark_pong();
            continue;
        }
        if message.is_close() {
            break;
        }
        if !message.is_text() {
            continue;
        }
        let text = match message.to_str() {
            Ok(text) => text,
            Err(_) => continue,
        };

        if let Err(e) = process_message(&state, &conn, &mut rate_limiter, text).await {
            match &e {
                NimbusError::Storage(_) => error!("Error handling {}: {}", conn.label(), e),
                _ => warn!("Closing {}: {}", conn.label(), e),
            }
            conn.close(e.close_code(), e.close_reason());
            break;
        }
    }

    // The single cleanup path, reached the same way from inbound errors,
    // transport errors, peer closes and supervisor-forced closes.
    state.supervisor.unregister(&conn.id).await;
    if let Some(room_id) = conn.room() {
        state.rooms.leave(&room_id, &conn.id).await;
    }
    conn.close(CLOSE_GENERIC_ERROR, "closed");
    info!("Connection closed: {}", conn.label());
}

/// Dispatch one inbound frame on a connection's serial message path. An
/// `Err` means the connection must be closed with the error's close code.
pub async fn process_message(
    state: &SharedState,
    conn: &Arc<Connection>,
    rate_limiter: &mut RateLimiter,
    text: &str,
) -> Result<()> {
    if rate_limiter.rate_limited() {
        return Err(NimbusError::RateLimited(
            rate_limiter.time_since_oldest().as_millis(),
        ));
    }

    match parse_client_message(text)? {
        ClientMessage::Handshake {
            room_id,
            username,
            variables,
        } => perform_handshake(state, conn, room_id, username, variables).await,
        // "create" is a pure alias: both kinds behave as set-or-create.
        ClientMessage::Set { name, value } => perform_set(state, conn, &name, &value).await,
        ClientMessage::Create { name, value } => perform_set(state, conn, &name, &value).await,
        ClientMessage::Delete { name } => perform_delete(state, conn, &name).await,
        ClientMessage::Rename { name, new_name } => {
            perform_rename(state, conn, &name, &new_name).await
        }
    }
}

async fn perform_handshake(
    state: &SharedState,
    conn: &Arc<Connection>,
    room_id: Value,
    username: Value,
    variables: HashMap<String, Value>,
) -> Result<()> {
    if conn.room().is_some() {
        return Err(NimbusError::DuplicateHandshake);
    }
    if !is_valid_room_id(&room_id) {
        return Err(NimbusError::InvalidRoomId(room_id.to_string()));
    }
    let room_id = room_id.as_str().unwrap_or_default().to_string();

    let raw_username = match username.as_str() {
        Some(name) => name,
        None => return Err(NimbusError::InvalidUsername(username.to_string())),
    };
    if !is_valid_username_str(raw_username) {
        return Err(NimbusError::InvalidUsername(raw_username.to_string()));
    }
    if !state.filter.is_safe(raw_username) {
        return Err(NimbusError::BlockedUsername(raw_username.to_string()));
    }
    let username = parse_username(raw_username, state.config.anonymize_generated_usernames);

    // May call out to an external service. Frames arriving meanwhile stay
    // queued on the transport; the connection's serial task replays them in
    // order once this returns.
    if !state.reputation.is_plausible_account(raw_username).await {
        return Err(NimbusError::ImplausibleUsername(username));
    }
    if conn.is_closed() {
        // Closed while the lookup was in flight; discard the result.
        return Ok(());
    }

    // Non-string declared values hydrate as "0", same as invalid ones.
    let declared: HashMap<String, String> = variables
        .iter()
        .map(|(name, value)| (name.clone(), value.as_str().unwrap_or("0").to_string()))
        .collect();
    if state.config.filter_variable_names {
        for name in declared.keys() {
            if !state.filter.is_safe(name) {
                return Err(NimbusError::BlockedVariableName);
            }
        }
    }

    // First writer wins the creation race; the loser comes around again and
    // takes the join path.
    loop {
        if state.rooms.has(&room_id).await {
            let names: Vec<&str> = declared.keys().map(String::as_str).collect();
            let member = Arc::clone(conn);
            // Anonymized guests are indistinguishable from each other, so
            // the duplicate-username policy only applies to real names.
            let check_duplicate = !is_generated(raw_username);
            let username_in_room = username.clone();
            let joined = state
                .rooms
                .update(&room_id, move |room| {
                    if check_duplicate && room.has_member_with_username(&username_in_room) {
                        return Err(NimbusError::UsernameTaken(username_in_room));
                    }
                    if !room.matches_variable_set(&names) {
                        return Err(NimbusError::VariableSchemaMismatch);
                    }
                    room.add_member(member)?;
                    Ok(snapshot_of(room))
                })
                .await;
            let snapshot = match joined {
                Ok(snapshot) => snapshot,
                // The room vanished between has() and update(); benign.
                Err(NimbusError::RoomNotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            conn.set_username(&username);
            conn.set_room(&room_id)?;
            send_snapshot(conn, &snapshot);
            info!("{} joined room {}", conn.label(), room_id);
            return Ok(());
        }

        match state.rooms.create(&room_id, &declared).await {
            Ok(hydrated) => {
                let member = Arc::clone(conn);
                let snapshot = state
                    .rooms
                    .update(&room_id, move |room| {
                        room.add_member(member)?;
                        Ok(snapshot_of(room))
                    })
                    .await?;

                conn.set_username(&username);
                conn.set_room(&room_id)?;
                // The creator already knows the variables it declared; only
                // a storage-hydrated room can differ from that.
                if hydrated {
                    send_snapshot(conn, &snapshot);
                }
                info!("{} created room {}", conn.label(), room_id);
                return Ok(());
            }
            Err(NimbusError::RoomExists(_)) => continue,
            Err(e) => return Err(e),
        }
    }
}

fn snapshot_of(room: &Room) -> Vec<(String, String)> {
    room.variables()
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn send_snapshot(conn: &Arc<Connection>, snapshot: &[(String, String)]) {
    if snapshot.is_empty() {
        return;
    }
    conn.send_text(&encode_set_batch(
        snapshot
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    ));
}

async fn perform_set(
    state: &SharedState,
    conn: &Arc<Connection>,
    name: &Value,
    value: &Value,
) -> Result<()> {
    let room_id = conn.room().ok_or(NimbusError::HandshakeRequired)?;

    let name = match name.as_str() {
        Some(name) => name.to_string(),
        None => return Err(NimbusError::InvalidVariableName),
    };
    // Bad values are dropped without closing the connection: clients emit
    // them routinely and the room must stay untouched.
    let value = match value.as_str() {
        Some(value) if is_valid_variable_value_str(value) => value.to_string(),
        _ => return Ok(()),
    };

    let filter = state
        .config
        .filter_variable_names
        .then(|| Arc::clone(&state.filter));
    let sender_id = conn.id.clone();
    let name_in_room = name.clone();
    let value_in_room = value.clone();
    let targets = state
        .rooms
        .update(&room_id, move |room| {
            if room.has(&name_in_room) {
                room.set(&name_in_room, &value_in_room)?;
            } else {
                if let Some(filter) = &filter {
                    if !filter.is_safe(&name_in_room) {
                        return Err(NimbusError::BlockedVariableName);
                    }
                }
                room.create(&name_in_room, &value_in_room)?;
            }
            Ok(room.others(&sender_id))
        })
        .await?;

    // Fan out to everyone else in the room; the sender is excluded.
    for target in &targets {
        state.scheduler.queue(target, &name, &value).await;
    }
    Ok(())
}

async fn perform_delete(state: &SharedState, conn: &Arc<Connection>, name: &Value) -> Result<()> {
    if !state.config.enable_delete {
        return Err(NimbusError::FeatureDisabled("Variable deletion"));
    }
    let room_id = conn.room().ok_or(NimbusError::HandshakeRequired)?;
    let name = match name.as_str() {
        Some(name) => name.to_string(),
        None => return Err(NimbusError::InvalidVariableName),
    };
    state
        .rooms
        .update(&room_id, move |room| room.delete(&name))
        .await
}

async fn perform_rename(
    state: &SharedState,
    conn: &Arc<Connection>,
    name: &Value,
    new_name: &Value,
) -> Result<()> {
    if !state.config.enable_rename {
        return Err(NimbusError::FeatureDisabled("Variable renaming"));
    }
    let room_id = conn.room().ok_or(NimbusError::HandshakeRequired)?;
    let old = match name.as_str() {
        Some(name) => name.to_string(),
        None => return Err(NimbusError::InvalidVariableName),
    };
    let new = match new_name.as_str() {
        Some(name) => name.to_string(),
        None => return Err(NimbusError::InvalidVariableName),
    };
    if state.config.filter_variable_names && !state.filter.is_safe(&new) {
        return Err(NimbusError::BlockedVariableName);
    }
    state
        .rooms
        .update(&room_id, move |room| room.rename(&old, &new))
        .await
}
