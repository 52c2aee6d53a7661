pub mod handlers;
mod moderator;
mod participant;
pub mod session;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::broadcast::spawn_participant_sync;
use crate::bus::Change;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::AppState;
use session::{Binding, Session};

type WsSender = SplitSink<WebSocket, Message>;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(sender: &mut WsSender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Next change from an optional subscription; pends forever while unbound
async fn next_change(rx: &mut Option<broadcast::Receiver<Change>>) -> Option<Change> {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(change) => return Some(change),
            // The next delivered version supersedes whatever was skipped
            Err(RecvError::Lagged(n)) => tracing::debug!("Subscriber lagged by {} changes", n),
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    let mut session = Session::new();
    let mut room_rx: Option<broadcast::Receiver<Change>> = None;
    let mut docs_rx: Option<broadcast::Receiver<Change>> = None;
    let mut sync_task: Option<JoinHandle<()>> = None;

    let mut countdown = tokio::time::interval(state.config.countdown_tick_interval());
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut poll = tokio::time::interval(state.config.reconcile_poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            change = next_change(&mut room_rx) => {
                let Some(change) = change else { room_rx = None; continue };
                if let Some(msg) = session.render_change(change, &state).await {
                    if !send(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            change = next_change(&mut docs_rx) => {
                let Some(change) = change else { docs_rx = None; continue };
                if let Some(msg) = session.render_change(change, &state).await {
                    if !send(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            _ = countdown.tick() => {
                let Some(room_id) = session.room_id() else { continue };
                let Some(room) = state.get_room(room_id).await else { continue };
                if let Some(msg) = session.countdown(&room, &state.tracker, chrono::Utc::now()) {
                    if !send(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            // Fallback for missed notifications: re-read the room, deduped by version
            _ = poll.tick() => {
                let Some(room_id) = session.room_id() else { continue };
                let Some(room) = state.get_room(room_id).await else { continue };
                if let Some(msg) = session.render_change(Change::Room(room), &state).await {
                    if !send(&mut sender, &msg).await {
                        break;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let was_bound = session.is_bound();
                                let response =
                                    handlers::handle_message(client_msg, &mut session, &state).await;

                                if !was_bound && session.is_bound() {
                                    let mut keys = session.subscriptions().into_iter();
                                    if let Some(key) = keys.next() {
                                        room_rx = Some(state.bus.subscribe(&key).await);
                                    }
                                    if let Some(key) = keys.next() {
                                        docs_rx = Some(state.bus.subscribe(&key).await);
                                    }
                                    if let Binding::Participant { room_id, participant_id } = &session.binding {
                                        sync_task = Some(spawn_participant_sync(
                                            state.clone(),
                                            room_id.clone(),
                                            participant_id.clone(),
                                        ));
                                    }
                                    tracing::info!("Session bound: {:?}", session.binding);
                                }
                                response
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                Some(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ))
                            }
                        };

                        if let Some(response) = response {
                            if !send(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(task) = sync_task {
        task.abort();
    }
    tracing::info!("WebSocket connection closed: {:?}", session.binding);
}
