//! `/negotiations/{id}/ws` — bi-directional per-negotiation socket. A
//! participant can send `typing` indicators; the server pushes offer,
//! message and status events. Supervisors attach read-only: their sends
//! are accepted but never published.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use tracing::warn;
use uuid::Uuid;

use crate::capability::CapabilityClaims;
use crate::db::Db;

use super::events::RoomEvent;
use super::rooms::RoomRegistry;

#[derive(Clone)]
pub struct RealtimeState {
    pub rooms: Arc<RoomRegistry>,
    pub db: Db,
}

pub async fn negotiation_ws(
    ws: WebSocketUpgrade,
    Path(negotiation_id): Path<Uuid>,
    State(state): State<RealtimeState>,
    claims: Option<axum::Extension<CapabilityClaims>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_negotiation_socket(socket, negotiation_id, state, claims))
}

async fn handle_negotiation_socket(
    mut socket: WebSocket,
    negotiation_id: Uuid,
    state: RealtimeState,
    claims: Option<axum::Extension<CapabilityClaims>>,
) {
    let actor_partner_id = claims.as_ref().and_then(|c| c.0.partner_id().ok());

    let negotiation = match state.db.get_negotiation(negotiation_id) {
        Ok(Some(n)) => n,
        _ => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let is_participant = actor_partner_id
        .map(|id| id == negotiation.buyer_partner_id || id == negotiation.seller_partner_id)
        .unwrap_or(false);
    let is_supervisor = claims
        .as_ref()
        .map(|c| c.0.has(crate::capability::Capability::Broker))
        .unwrap_or(false);

    if !is_participant && !is_supervisor {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    let read_only = is_supervisor && !is_participant;

    let room = RoomRegistry::negotiation_room(negotiation_id);
    let mut rx = state.rooms.subscribe(&room);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let msg = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(negotiation_id = %negotiation_id, skipped, "subscriber lagged, dropping buffered events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if read_only {
                            continue;
                        }
                        if let Some(partner_id) = actor_partner_id {
                            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                                if json.get("type").and_then(|t| t.as_str()) == Some("typing") {
                                    state.rooms.publish(&room, RoomEvent::TypingIndicator {
                                        negotiation_id,
                                        partner_id,
                                    });
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
