//! `POST/PATCH /requirements*` — buyer-side demand lifecycle: create runs
//! risk evaluation and, on PASS/WARN, fires the matching engine inline so
//! the caller's response can opportunistically report emitted tokens.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::{Capability, CapabilityClaims};
use crate::domain::{
    DeliveryLocation, IntentType, MarketVisibility, QualitySpec, Requirement, RequirementStatus, RiskState,
};
use crate::error::{AppError, AppResult};
use crate::realtime::{RoomEvent, RoomRegistry};
use crate::risk::{CreditProfile, EntityContext, RiskContext};

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRequirementRequest {
    pub buyer_branch_location_id: Option<Uuid>,
    pub commodity_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub preferred_price: f64,
    pub max_price: f64,
    pub quality_spec: QualitySpec,
    pub delivery_location: DeliveryLocation,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub intent_type: IntentType,
    pub market_visibility: MarketVisibility,
    #[serde(default)]
    pub invited_seller_ids: Vec<Uuid>,
    #[serde(default)]
    pub urgency: u8,
    pub eod_cutoff: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PatchRequirementRequest {
    pub preferred_price: Option<f64>,
    pub max_price: Option<f64>,
    pub quantity: Option<f64>,
    pub delivery_window_start: Option<DateTime<Utc>>,
    pub delivery_window_end: Option<DateTime<Utc>>,
    pub status: Option<RequirementStatus>,
}

#[derive(Debug, Serialize)]
pub struct CreateRequirementResponse {
    pub requirement: Requirement,
    pub matched_token_count: usize,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Json(body): Json<CreateRequirementRequest>,
) -> AppResult<Json<CreateRequirementResponse>> {
    claims_require(&claims, Capability::Buy)?;
    let buyer_partner_id = claims.partner_id().map_err(AppError::Internal)?;

    let commodity = state
        .db
        .get_commodity(body.commodity_id)?
        .ok_or_else(|| AppError::NotFound("commodity".into()))?;

    let mut requirement = Requirement {
        id: Uuid::new_v4(),
        buyer_partner_id,
        buyer_branch_location_id: body.buyer_branch_location_id,
        commodity_id: body.commodity_id,
        quantity: body.quantity,
        unit: body.unit,
        preferred_price: body.preferred_price,
        max_price: body.max_price,
        quality_spec: body.quality_spec,
        delivery_location: body.delivery_location,
        delivery_window_start: body.delivery_window_start,
        delivery_window_end: body.delivery_window_end,
        intent_type: body.intent_type,
        market_visibility: body.market_visibility,
        invited_seller_ids: body.invited_seller_ids,
        urgency: body.urgency,
        eod_cutoff: body.eod_cutoff,
        status: RequirementStatus::Draft,
        version: 0,
        risk_state: RiskState::Pending,
        embedding: None,
    };
    requirement.validate_visibility_invariant()?;

    let risk_outcome = state.risk.evaluate(&RiskContext::Entity(EntityContext {
        partner_id: buyer_partner_id,
        pan_or_equivalent: None,
        capabilities: claims.capabilities.clone(),
        required_capability: Capability::Buy,
        credit: CreditProfile::default(),
        sanctions_hit: false,
        export_license_required: false,
        export_license_present: false,
    }));
    requirement.risk_state = risk_outcome.status;
    requirement.status = match requirement.risk_state {
        RiskState::Pass | RiskState::Warn => RequirementStatus::Active,
        _ => RequirementStatus::Blocked,
    };

    state.db.upsert_requirement(&requirement)?;

    let mut matched_token_count = 0;
    if requirement.status == RequirementStatus::Active {
        let outcome = state.matching.match_requirement(&requirement, &commodity)?;
        matched_token_count = outcome.tokens.len();
        notify_requirement_room(&state.rooms, requirement.id, &outcome);
    }

    Ok(Json(CreateRequirementResponse { requirement, matched_token_count }))
}

pub async fn patch(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<PatchRequirementRequest>,
) -> AppResult<Json<Requirement>> {
    let mut requirement = load_owned(&state, &claims, id)?;

    if let Some(status) = body.status {
        if !requirement.status.can_transition_to(status) {
            return Err(AppError::precondition(
                "ILLEGAL_STATUS_TRANSITION",
                format!("cannot move requirement from {:?} to {:?}", requirement.status, status),
            ));
        }
        requirement.status = status;
    }
    if let Some(v) = body.preferred_price {
        requirement.preferred_price = v;
    }
    if let Some(v) = body.max_price {
        requirement.max_price = v;
    }
    if let Some(v) = body.quantity {
        requirement.quantity = v;
    }
    if let Some(v) = body.delivery_window_start {
        requirement.delivery_window_start = v;
    }
    if let Some(v) = body.delivery_window_end {
        requirement.delivery_window_end = v;
    }
    requirement.version += 1;
    state.db.upsert_requirement(&requirement)?;
    Ok(Json(requirement))
}

pub async fn publish(State(state): State<AppState>, Extension(claims): Extension<CapabilityClaims>, Path(id): Path<Uuid>) -> AppResult<Json<CreateRequirementResponse>> {
    let mut requirement = load_owned(&state, &claims, id)?;
    if !requirement.status.can_transition_to(RequirementStatus::Active) {
        return Err(AppError::precondition("ILLEGAL_STATUS_TRANSITION", "requirement cannot be published from its current state"));
    }
    let commodity = state
        .db
        .get_commodity(requirement.commodity_id)?
        .ok_or_else(|| AppError::NotFound("commodity".into()))?;

    requirement.status = RequirementStatus::Active;
    requirement.version += 1;
    state.db.upsert_requirement(&requirement)?;

    let outcome = state.matching.match_requirement(&requirement, &commodity)?;
    notify_requirement_room(&state.rooms, requirement.id, &outcome);
    Ok(Json(CreateRequirementResponse { matched_token_count: outcome.tokens.len(), requirement }))
}

pub async fn cancel(State(state): State<AppState>, Extension(claims): Extension<CapabilityClaims>, Path(id): Path<Uuid>) -> AppResult<Json<Requirement>> {
    let mut requirement = load_owned(&state, &claims, id)?;
    if !requirement.status.can_transition_to(RequirementStatus::Cancelled) {
        return Err(AppError::precondition("ILLEGAL_STATUS_TRANSITION", "requirement cannot be cancelled from its current state"));
    }
    requirement.status = RequirementStatus::Cancelled;
    requirement.version += 1;
    state.db.upsert_requirement(&requirement)?;
    Ok(Json(requirement))
}

#[derive(Debug, Deserialize)]
pub struct AiAdjustRequest {
    pub preferred_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Applies an AI-suggested price adjustment; the caller (not this endpoint)
/// is responsible for deciding whether to accept the suggestion first.
pub async fn ai_adjust(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<AiAdjustRequest>,
) -> AppResult<Json<Requirement>> {
    let mut requirement = load_owned(&state, &claims, id)?;
    if let Some(v) = body.preferred_price {
        requirement.preferred_price = v;
    }
    if let Some(v) = body.max_price {
        requirement.max_price = v;
    }
    requirement.version += 1;
    state.db.upsert_requirement(&requirement)?;
    Ok(Json(requirement))
}

#[derive(Debug, Deserialize)]
pub struct FulfillmentRequest {
    pub fulfilled_quantity: f64,
}

pub async fn fulfillment(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<FulfillmentRequest>,
) -> AppResult<Json<Requirement>> {
    let mut requirement = load_owned(&state, &claims, id)?;
    if body.fulfilled_quantity + 1e-9 >= requirement.quantity {
        if !requirement.status.can_transition_to(RequirementStatus::Fulfilled) {
            return Err(AppError::precondition("ILLEGAL_STATUS_TRANSITION", "requirement cannot be marked fulfilled from its current state"));
        }
        requirement.status = RequirementStatus::Fulfilled;
        requirement.version += 1;
        state.db.upsert_requirement(&requirement)?;
    }
    Ok(Json(requirement))
}

fn load_owned(state: &AppState, claims: &CapabilityClaims, id: Uuid) -> AppResult<Requirement> {
    let requirement = state.db.get_requirement(id)?.ok_or_else(|| AppError::NotFound("requirement".into()))?;
    let partner_id = claims.partner_id().map_err(AppError::Internal)?;
    if requirement.buyer_partner_id != partner_id {
        return Err(AppError::Authorization("not the owning buyer".into()));
    }
    Ok(requirement)
}

fn claims_require(claims: &CapabilityClaims, cap: Capability) -> AppResult<()> {
    if !claims.has(cap) {
        return Err(AppError::Authorization(format!("missing required capability {cap:?}")));
    }
    Ok(())
}

fn notify_requirement_room(rooms: &Arc<RoomRegistry>, requirement_id: Uuid, outcome: &crate::matching::MatchOutcome) {
    rooms.publish(
        &RoomRegistry::requirement_room(requirement_id),
        RoomEvent::RequirementChanged {
            requirement_id,
            correlation_id: Uuid::new_v4(),
            payload: serde_json::json!({ "matchTokenCount": outcome.tokens.len() }),
        },
    );
}
