use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::fault;
use crate::protocol::{ClientEvent, PushEvent, ADD_PLANT_FAILED};
use crate::session::SessionData;
use crate::store::Plant;

use super::auth::SessionId;
use super::AppState;

pub(super) async fn socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
) -> impl IntoResponse {
    // The connection keeps the session as it was at connect time.
    let conn = session.data(&state);
    ws.on_upgrade(move |socket| handle_socket(socket, state, conn))
}

async fn next_push(
    room: &mut Option<broadcast::Receiver<PushEvent>>,
) -> Result<PushEvent, broadcast::error::RecvError> {
    match room {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, conn: SessionData) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut room = conn.user_id.map(|user_id| {
        let rx = state.registry.register(user_id, conn.error_mode);
        tracing::info!(
            user_id,
            error_mode = conn.error_mode,
            "user connected and joined their room"
        );
        rx
    });

    loop {
        tokio::select! {
            // Room events -> WebSocket
            event = next_push(&mut room) => {
                match event {
                    Ok(event) => {
                        if ws_tx.send(Message::Text(event.to_json().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "socket client lagged, dropping push events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // WebSocket -> client event handling
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&state, conn, text.as_str()).await {
                            if ws_tx.send(Message::Text(reply.to_json().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ping/Pong handled automatically
                    Some(Err(_)) => break,
                }
            }

            _ = state.shutdown.cancelled() => {
                tracing::debug!("WebSocket received shutdown signal, closing");
                let close_frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: "server shutting down".into(),
                };
                let _ = ws_tx.send(Message::Close(Some(close_frame))).await;
                let _ = ws_tx.flush().await;
                break;
            }
        }
    }

    drop(room);
    if let Some(user_id) = conn.user_id {
        if state.registry.unregister(user_id).is_some() {
            tracing::info!(user_id, "user disconnected and was removed from active list");
        }
    }
}

/// Handle one text frame. Returns an event for the sending connection only.
pub(super) async fn handle_client_message(
    state: &AppState,
    conn: SessionData,
    text: &str,
) -> Option<PushEvent> {
    match ClientEvent::parse(text) {
        Ok(ClientEvent::AddPlant {
            plant_name,
            plant_type,
        }) => add_plant(state, conn, &plant_name, &plant_type).await.err(),
        Err(e) => {
            tracing::debug!(error = %e, "invalid client message");
            Some(PushEvent::error(format!("Invalid message: {e}")))
        }
    }
}

/// Create a plant for the connection's user and announce it to their room.
///
/// On refusal or failure the returned `Err` carries the `error` event meant
/// for the requesting connection.
pub async fn add_plant(
    state: &AppState,
    conn: SessionData,
    plant_name: &str,
    plant_type: &str,
) -> Result<Plant, PushEvent> {
    let user_id = match conn.user_id {
        Some(id) if !fault::tripped(conn.error_mode, state.faults.as_ref()) => id,
        _ => {
            tracing::error!("unauthorized or failed attempt to add plant");
            return Err(PushEvent::error(ADD_PLANT_FAILED));
        }
    };

    let (name, kind) = (plant_name.trim(), plant_type.trim());
    if name.is_empty() || kind.is_empty() {
        return Err(PushEvent::error("Plant name and type are required"));
    }

    let plant = state.store.create_plant(user_id, name, kind).await.map_err(|e| {
        tracing::error!(user_id, error = %e, "failed to store new plant");
        PushEvent::error(ADD_PLANT_FAILED)
    })?;

    state.registry.broker().publish(
        user_id,
        PushEvent::NewPlant {
            plant_id: plant.id,
            plant_name: plant.name.clone(),
            plant_type: plant.plant_type.clone(),
        },
    );
    tracing::info!(user_id, plant_id = plant.id, "new plant {} added successfully", plant.name);
    Ok(plant)
}
