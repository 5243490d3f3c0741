//! `POST/PATCH /availabilities*` — seller-side supply lifecycle, mirroring
//! requirements.rs plus the reserve/release/mark-sold quantity actions.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::{Capability, CapabilityClaims};
use crate::domain::{
    ApprovalStatus, Availability, AvailabilityIntent, AvailabilityStatus, DeliveryLocation, MarketVisibility,
    QualitySpec, RiskState,
};
use crate::error::{AppError, AppResult};
use crate::realtime::{RoomEvent, RoomRegistry};
use crate::risk::{CreditProfile, EntityContext, RiskContext};

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub seller_branch_location_id: Option<Uuid>,
    pub commodity_id: Uuid,
    pub total_quantity: f64,
    pub unit: String,
    pub asking_price: f64,
    #[serde(default)]
    pub allow_partial_order: bool,
    #[serde(default)]
    pub min_order_quantity: f64,
    pub quality_spec: QualitySpec,
    pub delivery_location: DeliveryLocation,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub intent_type: AvailabilityIntent,
    pub market_visibility: MarketVisibility,
    #[serde(default)]
    pub invited_buyer_ids: Vec<Uuid>,
    pub eod_cutoff: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PatchAvailabilityRequest {
    pub asking_price: Option<f64>,
    pub delivery_window_start: Option<DateTime<Utc>>,
    pub delivery_window_end: Option<DateTime<Utc>>,
    pub status: Option<AvailabilityStatus>,
}

#[derive(Debug, Serialize)]
pub struct CreateAvailabilityResponse {
    pub availability: Availability,
    pub matched_token_count: usize,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Json(body): Json<CreateAvailabilityRequest>,
) -> AppResult<Json<CreateAvailabilityResponse>> {
    claims_require(&claims, Capability::Sell)?;
    let seller_partner_id = claims.partner_id().map_err(AppError::Internal)?;

    let commodity = state
        .db
        .get_commodity(body.commodity_id)?
        .ok_or_else(|| AppError::NotFound("commodity".into()))?;

    let mut availability = Availability {
        id: Uuid::new_v4(),
        seller_partner_id,
        seller_branch_location_id: body.seller_branch_location_id,
        commodity_id: body.commodity_id,
        total_quantity: body.total_quantity,
        available_quantity: body.total_quantity,
        reserved_quantity: 0.0,
        sold_quantity: 0.0,
        unit: body.unit,
        asking_price: body.asking_price,
        allow_partial_order: body.allow_partial_order,
        min_order_quantity: body.min_order_quantity,
        quality_spec: body.quality_spec,
        delivery_location: body.delivery_location,
        delivery_window_start: body.delivery_window_start,
        delivery_window_end: body.delivery_window_end,
        intent_type: body.intent_type,
        market_visibility: body.market_visibility,
        invited_buyer_ids: body.invited_buyer_ids,
        approval_status: ApprovalStatus::Pending,
        eod_cutoff: body.eod_cutoff,
        status: AvailabilityStatus::Draft,
        version: 0,
        risk_state: RiskState::Pending,
        embedding: None,
    };

    let risk_outcome = state.risk.evaluate(&RiskContext::Entity(EntityContext {
        partner_id: seller_partner_id,
        pan_or_equivalent: None,
        capabilities: claims.capabilities.clone(),
        required_capability: Capability::Sell,
        credit: CreditProfile::default(),
        sanctions_hit: false,
        export_license_required: false,
        export_license_present: false,
    }));
    availability.risk_state = risk_outcome.status;
    availability.status = match availability.risk_state {
        RiskState::Pass | RiskState::Warn => AvailabilityStatus::Active,
        _ => AvailabilityStatus::Blocked,
    };

    state.db.upsert_availability(&availability)?;

    let mut matched_token_count = 0;
    if availability.status == AvailabilityStatus::Active {
        let outcome = state.matching.match_availability(&availability, &commodity)?;
        matched_token_count = outcome.tokens.len();
        notify_availability_room(&state.rooms, availability.id, matched_token_count);
    }

    Ok(Json(CreateAvailabilityResponse { availability, matched_token_count }))
}

pub async fn patch(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchAvailabilityRequest>,
) -> AppResult<Json<Availability>> {
    let mut availability = load_owned(&state, &claims, id)?;
    if let Some(price) = body.asking_price {
        availability.asking_price = price;
    }
    if let Some(v) = body.delivery_window_start {
        availability.delivery_window_start = v;
    }
    if let Some(v) = body.delivery_window_end {
        availability.delivery_window_end = v;
    }
    if let Some(status) = body.status {
        availability.status = status;
    }
    availability.version += 1;
    state.db.upsert_availability(&availability)?;
    Ok(Json(availability))
}

pub async fn approve(State(state): State<AppState>, Extension(claims): Extension<CapabilityClaims>, Path(id): Path<Uuid>) -> AppResult<Json<Availability>> {
    claims_require(&claims, Capability::Broker)?;
    let mut availability = state.db.get_availability(id)?.ok_or_else(|| AppError::NotFound("availability".into()))?;
    availability.approval_status = ApprovalStatus::Approved;
    availability.version += 1;
    state.db.upsert_availability(&availability)?;
    Ok(Json(availability))
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub buyer_partner_id: Uuid,
    pub quantity: f64,
    #[serde(default)]
    pub hold_hours: Option<i64>,
}

pub async fn reserve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReserveRequest>,
) -> AppResult<Json<Availability>> {
    let current = state.db.get_availability(id)?.ok_or_else(|| AppError::NotFound("availability".into()))?;
    let expected_version = current.version;
    let next = current.try_reserve(body.quantity)?;
    if !state.db.cas_update_availability(&next, expected_version)? {
        return Err(AppError::Conflict("INSUFFICIENT_QUANTITY".into()));
    }
    let _ = body.hold_hours;
    notify_availability_room(&state.rooms, id, 0);
    Ok(Json(next))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub buyer_partner_id: Uuid,
    pub reason: String,
}

pub async fn release(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReleaseRequest>,
) -> AppResult<Json<Availability>> {
    let current = state.db.get_availability(id)?.ok_or_else(|| AppError::NotFound("availability".into()))?;
    let expected_version = current.version;
    let quantity = current.reserved_quantity;
    let next = current.release(quantity)?;
    if !state.db.cas_update_availability(&next, expected_version)? {
        return Err(AppError::Conflict("version mismatch, retry".into()));
    }
    let _ = (body.buyer_partner_id, body.reason);
    Ok(Json(next))
}

pub async fn mark_sold(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Availability>> {
    let current = state.db.get_availability(id)?.ok_or_else(|| AppError::NotFound("availability".into()))?;
    let expected_version = current.version;
    let quantity = current.reserved_quantity;
    let next = current.mark_sold(quantity)?;
    if !state.db.cas_update_availability(&next, expected_version)? {
        return Err(AppError::Conflict("version mismatch, retry".into()));
    }
    Ok(Json(next))
}

fn load_owned(state: &AppState, claims: &CapabilityClaims, id: Uuid) -> AppResult<Availability> {
    let availability = state.db.get_availability(id)?.ok_or_else(|| AppError::NotFound("availability".into()))?;
    let partner_id = claims.partner_id().map_err(AppError::Internal)?;
    if availability.seller_partner_id != partner_id {
        return Err(AppError::Authorization("not the owning seller".into()));
    }
    Ok(availability)
}

fn claims_require(claims: &CapabilityClaims, cap: Capability) -> AppResult<()> {
    if !claims.has(cap) {
        return Err(AppError::Authorization(format!("missing required capability {cap:?}")));
    }
    Ok(())
}

fn notify_availability_room(rooms: &Arc<RoomRegistry>, availability_id: Uuid, matched_token_count: usize) {
    rooms.publish(
        &RoomRegistry::availability_room(availability_id),
        RoomEvent::AvailabilityChanged {
            availability_id,
            correlation_id: Uuid::new_v4(),
            payload: serde_json::json!({ "matchTokenCount": matched_token_count }),
        },
    );
}
