//! `/negotiations*` — the alternating-offer surface plus chat and optional
//! AI hints, all delegated straight to the negotiation engine.

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::CapabilityClaims;
use crate::error::{AppError, AppResult};
use crate::negotiation::{should_auto_accept, suggest_counter, AutoAcceptTolerance, Negotiation, NegotiationMessage, NegotiationOffer, Side};
use crate::realtime::{RoomEvent, RoomRegistry};

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartNegotiationRequest {
    pub match_token_id: Uuid,
    pub initial_message: Option<String>,
}

pub async fn start(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Json(body): Json<StartNegotiationRequest>,
) -> AppResult<Json<Negotiation>> {
    let actor_partner_id = claims.partner_id().map_err(AppError::Internal)?;

    let token = state
        .db
        .find_match_token_by_id(body.match_token_id)?
        .ok_or_else(|| AppError::NotFound("match token".into()))?;
    let requirement = state
        .db
        .get_requirement(token.requirement_id)?
        .ok_or_else(|| AppError::NotFound("requirement".into()))?;
    let availability = state
        .db
        .get_availability(token.availability_id)?
        .ok_or_else(|| AppError::NotFound("availability".into()))?;

    if actor_partner_id != requirement.buyer_partner_id && actor_partner_id != availability.seller_partner_id {
        return Err(AppError::Authorization("not a counterparty on this match token".into()));
    }

    let initial_price = (requirement.preferred_price + availability.asking_price) / 2.0;
    let initial_quantity = requirement.quantity.min(availability.available_quantity);

    let negotiation = state
        .negotiation
        .start(
            token.id,
            requirement.id,
            availability.id,
            requirement.buyer_partner_id,
            availability.seller_partner_id,
            initial_price,
            initial_quantity,
            body.initial_message,
        )
        .map_err(AppError::from_anyhow)?;

    notify(&state.rooms, &negotiation, "negotiation.started");
    Ok(Json(negotiation))
}

#[derive(Debug, Deserialize)]
pub struct MakeOfferRequest {
    pub price_per_unit: f64,
    pub quantity: f64,
    pub delivery_terms: Option<String>,
    pub payment_terms: Option<String>,
    pub quality_conditions: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OfferResponse {
    pub negotiation: Negotiation,
    pub offer: NegotiationOffer,
}

pub async fn make_offer(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<MakeOfferRequest>,
) -> AppResult<Json<OfferResponse>> {
    let actor_partner_id = claims.partner_id().map_err(AppError::Internal)?;
    let (negotiation, offer) = state
        .negotiation
        .make_offer(
            id,
            actor_partner_id,
            body.price_per_unit,
            body.quantity,
            body.delivery_terms,
            body.payment_terms,
            body.quality_conditions,
            body.message,
        )
        .map_err(AppError::from_anyhow)?;
    notify(&state.rooms, &negotiation, "negotiation.offer_made");
    Ok(Json(OfferResponse { negotiation, offer }))
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub message: Option<String>,
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<AcceptRequest>,
) -> AppResult<Json<Negotiation>> {
    let actor_partner_id = claims.partner_id().map_err(AppError::Internal)?;
    let negotiation = state
        .negotiation
        .accept(id, actor_partner_id, body.message)
        .map_err(AppError::from_anyhow)?;
    notify(&state.rooms, &negotiation, "negotiation.accepted");
    Ok(Json(negotiation))
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
    pub counter_price: Option<f64>,
    pub counter_quantity: Option<f64>,
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> AppResult<Json<Negotiation>> {
    let actor_partner_id = claims.partner_id().map_err(AppError::Internal)?;
    let counter = match (body.counter_price, body.counter_quantity) {
        (Some(p), Some(q)) => Some((p, q)),
        _ => None,
    };
    let negotiation = state
        .negotiation
        .reject(id, actor_partner_id, body.reason, counter)
        .map_err(AppError::from_anyhow)?;
    notify(&state.rooms, &negotiation, "negotiation.rejected");
    Ok(Json(negotiation))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

fn default_message_type() -> String {
    "text".into()
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<Json<NegotiationMessage>> {
    let actor_partner_id = claims.partner_id().map_err(AppError::Internal)?;
    let message = state
        .negotiation
        .send_message(id, actor_partner_id, body.content, body.message_type)
        .map_err(AppError::from_anyhow)?;

    state.rooms.publish(
        &RoomRegistry::negotiation_room(id),
        RoomEvent::MessageReceived {
            negotiation_id: id,
            correlation_id: Uuid::new_v4(),
            payload: serde_json::json!({ "messageId": message.id }),
        },
    );
    Ok(Json(message))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<NegotiationMessage>>> {
    Ok(Json(state.db.messages_for_negotiation(id)?))
}

#[derive(Debug, Serialize)]
pub struct AiSuggestResponse {
    pub suggestion: Option<crate::negotiation::SuggestedCounter>,
    pub auto_accept_recommended: bool,
}

/// Opt-in, never blocking: the caller decides whether to submit the
/// suggested counter as an actual offer via `make_offer`.
pub async fn ai_suggest(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AiSuggestResponse>> {
    let actor_partner_id = claims.partner_id().map_err(AppError::Internal)?;
    let negotiation = state.db.get_negotiation(id)?.ok_or_else(|| AppError::NotFound("negotiation".into()))?;
    let side = negotiation
        .side_of(actor_partner_id)
        .ok_or_else(|| AppError::Authorization("not a participant in this negotiation".into()))?;

    if !negotiation.ai_suggestions_enabled {
        return Ok(Json(AiSuggestResponse { suggestion: None, auto_accept_recommended: false }));
    }

    let offers = state.db.offers_for_negotiation(id)?;
    let Some(pending) = offers.into_iter().find(|o| o.status == crate::negotiation::OfferStatus::Pending) else {
        return Ok(Json(AiSuggestResponse { suggestion: None, auto_accept_recommended: false }));
    };

    let requirement = state.db.get_requirement(negotiation.requirement_id)?;
    let availability = state.db.get_availability(negotiation.availability_id)?;
    let (reference_price, reference_quantity) = match side {
        Side::Buyer => (
            requirement.as_ref().map(|r| r.preferred_price).unwrap_or(pending.price_per_unit),
            requirement.as_ref().map(|r| r.quantity).unwrap_or(pending.quantity),
        ),
        Side::Seller => (
            availability.as_ref().map(|a| a.asking_price).unwrap_or(pending.price_per_unit),
            availability.as_ref().map(|a| a.available_quantity).unwrap_or(pending.quantity),
        ),
    };

    let suggestion = suggest_counter(&pending, side, reference_price, reference_quantity, negotiation.current_round);
    let auto_negotiate_enabled = match side {
        Side::Buyer => negotiation.auto_negotiate_buyer,
        Side::Seller => negotiation.auto_negotiate_seller,
    };
    let auto_accept_recommended =
        should_auto_accept(&pending, reference_price, reference_quantity, auto_negotiate_enabled, AutoAcceptTolerance::default());

    Ok(Json(AiSuggestResponse { suggestion: Some(suggestion), auto_accept_recommended }))
}

pub async fn list_for_caller(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
) -> AppResult<Json<Vec<Negotiation>>> {
    let partner_id = claims.partner_id().map_err(AppError::Internal)?;
    Ok(Json(state.db.negotiations_for_partner(partner_id)?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Negotiation>> {
    Ok(Json(state.db.get_negotiation(id)?.ok_or_else(|| AppError::NotFound("negotiation".into()))?))
}

fn notify(rooms: &std::sync::Arc<RoomRegistry>, negotiation: &Negotiation, _kind: &str) {
    rooms.publish(
        &RoomRegistry::negotiation_room(negotiation.id),
        RoomEvent::NegotiationStatusChanged {
            negotiation_id: negotiation.id,
            correlation_id: Uuid::new_v4(),
            status: format!("{:?}", negotiation.status).to_uppercase(),
        },
    );
}
