use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    OfferCreated { negotiation_id: Uuid, correlation_id: Uuid, payload: Value },
    MessageReceived { negotiation_id: Uuid, correlation_id: Uuid, payload: Value },
    NegotiationStatusChanged { negotiation_id: Uuid, correlation_id: Uuid, status: String },
    TypingIndicator { negotiation_id: Uuid, partner_id: Uuid },
    AvailabilityChanged { availability_id: Uuid, correlation_id: Uuid, payload: Value },
    RequirementChanged { requirement_id: Uuid, correlation_id: Uuid, payload: Value },
}

impl RoomEvent {
    /// Non-critical events are dropped first under slow-subscriber
    /// backpressure; everything else (offers, status, changes) is critical.
    pub fn is_critical(&self) -> bool {
        !matches!(self, RoomEvent::TypingIndicator { .. })
    }
}
