use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::rest::auth::{Caller, Role};
use crate::broadcast::Audience;
use crate::error::AppError;
use crate::models::event::TrackingEvent;
use crate::state::AppState;
use crate::tracking::{LocationReport, LocationTarget};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinDeliveryRoom { delivery_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveDeliveryRoom { delivery_id: Uuid },
    #[serde(rename_all = "camelCase")]
    DriverLocationUpdate {
        delivery_id: Option<Uuid>,
        session_id: Option<Uuid>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        speed: Option<f64>,
        recorded_at: Option<DateTime<Utc>>,
    },
}

type Rooms = StreamMap<String, BroadcastStream<TrackingEvent>>;

/// The role comes from the trusted auth annotation on the upgrade request,
/// never from client messages. Unannotated connections see what customers see.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    caller: Option<Caller>,
) -> impl IntoResponse {
    let role = caller.map(|caller| caller.role);
    ws.on_upgrade(move |socket| handle_socket(socket, state, role))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, role: Option<Role>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rooms: Rooms = StreamMap::new();

    info!(role = ?role, "tracking websocket client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };

                let reply = match handle_client_message(&state, &mut rooms, role, &text).await {
                    Ok(reply) => reply,
                    Err(err) => Some(error_frame(&err)),
                };

                if let Some(reply) = reply {
                    if send_json(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
            }
            Some((room, event)) = rooms.next(), if !rooms.is_empty() => {
                let event = match event {
                    Ok(event) => event,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(room = %room, skipped, "websocket subscriber lagged");
                        continue;
                    }
                };

                let payload = match serde_json::to_value(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize tracking event for ws");
                        continue;
                    }
                };

                if send_json(&mut sender, &payload).await.is_err() {
                    break;
                }
            }
        }
    }

    let joined: Vec<String> = rooms.keys().cloned().collect();
    drop(rooms);
    for room in &joined {
        state.hub.release(room);
    }

    info!(rooms = joined.len(), "tracking websocket client disconnected");
}

fn error_frame(err: &AppError) -> Value {
    json!({ "event": "error", "message": err.to_string() })
}

async fn handle_client_message(
    state: &AppState,
    rooms: &mut Rooms,
    role: Option<Role>,
    text: &str,
) -> Result<Option<Value>, AppError> {
    let message: ClientMessage = serde_json::from_str(text)
        .map_err(|err| AppError::Validation(format!("malformed message: {err}")))?;

    match message {
        ClientMessage::JoinDeliveryRoom { delivery_id } => {
            if state.deliveries.get_delivery(delivery_id).await?.is_none() {
                return Err(AppError::DeliveryNotFound(delivery_id));
            }

            // an unannotated subscriber only sees what customers see
            let audience = role.map(Role::audience).unwrap_or(Audience::Customer);
            let room = state.gateway.broadcaster().room_for(delivery_id, audience);
            rooms.insert(room.clone(), BroadcastStream::new(state.hub.subscribe(&room)));

            debug!(room = %room, role = ?role, "joined delivery room");
            Ok(Some(json!({
                "event": "joinedDeliveryRoom",
                "deliveryId": delivery_id,
                "audience": audience,
            })))
        }
        ClientMessage::LeaveDeliveryRoom { delivery_id } => {
            let broadcaster = state.gateway.broadcaster();
            for audience in [Audience::Operations, Audience::Customer] {
                let room = broadcaster.room_for(delivery_id, audience);
                if rooms.remove(&room).is_some() {
                    state.hub.release(&room);
                }
            }
            Ok(Some(json!({
                "event": "leftDeliveryRoom",
                "deliveryId": delivery_id,
            })))
        }
        ClientMessage::DriverLocationUpdate {
            delivery_id,
            session_id,
            latitude,
            longitude,
            speed,
            recorded_at,
        } => {
            if role != Some(Role::Driver) {
                return Err(AppError::Forbidden(
                    "only drivers may send location updates".to_string(),
                ));
            }

            let target = match (session_id, delivery_id) {
                (Some(session_id), _) => LocationTarget::Session(session_id),
                (None, Some(delivery_id)) => LocationTarget::Delivery(delivery_id),
                (None, None) => {
                    return Err(AppError::Validation(
                        "sessionId or deliveryId is required".to_string(),
                    ));
                }
            };

            state
                .gateway
                .ingest(LocationReport {
                    target,
                    latitude,
                    longitude,
                    speed,
                    recorded_at,
                })
                .await?;
            Ok(None)
        }
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &Value,
) -> Result<(), axum::Error> {
    sender.send(Message::Text(value.to_string())).await
}
