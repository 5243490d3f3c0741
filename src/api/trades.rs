//! `/trades*` — completeness validation, creation from an accepted
//! negotiation, address confirmation, signature collection.

use axum::extract::{Extension, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::CapabilityClaims;
use crate::domain::Location;
use crate::error::{AppError, AppResult};
use crate::negotiation::{Negotiation, NegotiationStatus};
use crate::trade::{validate_trade, Address, DraftTerms, SignatorySide, Trade};

use super::state::AppState;

fn require_party(claims: &CapabilityClaims, negotiation: &Negotiation) -> AppResult<()> {
    let partner_id = claims.partner_id().map_err(AppError::Internal)?;
    if negotiation.side_of(partner_id).is_none() {
        return Err(AppError::Authorization("not a party to this negotiation".into()));
    }
    Ok(())
}

fn require_trade_party(claims: &CapabilityClaims, trade: &Trade) -> AppResult<()> {
    let partner_id = claims.partner_id().map_err(AppError::Internal)?;
    if partner_id != trade.buyer_partner_id && partner_id != trade.seller_partner_id {
        return Err(AppError::Authorization("not a party to this trade".into()));
    }
    Ok(())
}

/// Dry-run completeness check against an already-accepted negotiation's
/// current offer terms; creates nothing.
pub async fn validate_negotiation(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(negotiation_id): Path<Uuid>,
    Json(draft): Json<DraftTerms>,
) -> AppResult<Json<serde_json::Value>> {
    let negotiation = state
        .db
        .get_negotiation(negotiation_id)?
        .ok_or_else(|| AppError::NotFound("negotiation".into()))?;
    require_party(&claims, &negotiation)?;
    if negotiation.status != NegotiationStatus::Accepted {
        return Err(AppError::precondition("NEGOTIATION_NOT_ACCEPTED", "trade can only be validated from an accepted negotiation"));
    }
    let missing = state.trade.validate_draft(&draft);
    Ok(Json(serde_json::json!({ "missingFields": missing })))
}

#[derive(Debug, Deserialize)]
pub struct CreateTradeRequest {
    pub negotiation_id: Uuid,
    #[serde(flatten)]
    pub draft: DraftTerms,
    pub buyer_branches: Vec<Location>,
    pub seller_branches: Vec<Location>,
    pub reference_state: String,
    pub reference_lat: f64,
    pub reference_lng: f64,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Json(body): Json<CreateTradeRequest>,
) -> AppResult<Json<Trade>> {
    let negotiation = state
        .db
        .get_negotiation(body.negotiation_id)?
        .ok_or_else(|| AppError::NotFound("negotiation".into()))?;
    require_party(&claims, &negotiation)?;

    let trade = state
        .trade
        .create_from_negotiation(
            &negotiation,
            body.draft,
            body.buyer_branches,
            body.seller_branches,
            &body.reference_state,
            body.reference_lat,
            body.reference_lng,
        )
        .map_err(AppError::from_anyhow)?;
    Ok(Json(trade))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmAddressesRequest {
    pub buyer_address: Option<Address>,
    pub seller_address: Option<Address>,
}

pub async fn confirm_addresses(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmAddressesRequest>,
) -> AppResult<Json<Trade>> {
    let existing = state.db.get_trade(id)?.ok_or_else(|| AppError::NotFound("trade".into()))?;
    require_trade_party(&claims, &existing)?;
    let trade = state
        .trade
        .confirm_addresses(id, body.buyer_address, body.seller_address)
        .map_err(AppError::from_anyhow)?;
    Ok(Json(trade))
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub side: SignatorySide,
}

pub async fn sign(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
    Json(body): Json<SignRequest>,
) -> AppResult<Json<Trade>> {
    let existing = state.db.get_trade(id)?.ok_or_else(|| AppError::NotFound("trade".into()))?;
    require_trade_party(&claims, &existing)?;
    let signed_by_partner_id = claims.partner_id().map_err(AppError::Internal)?;
    let trade = state
        .trade
        .sign(id, body.side, signed_by_partner_id)
        .map_err(AppError::from_anyhow)?;
    Ok(Json(trade))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Trade>> {
    Ok(Json(state.db.get_trade(id)?.ok_or_else(|| AppError::NotFound("trade".into()))?))
}

#[derive(Debug, Serialize)]
pub struct ContractSummary {
    pub trade_id: Uuid,
    pub contract_hash: Option<String>,
    pub outstanding_fields: Vec<String>,
}

/// No PDF rendering engine exists in this core; the contract artifact is
/// the frozen, hash-addressed term set the negotiation produced, served as
/// the plain-text summary a downstream document renderer would consume.
pub async fn contract(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<impl IntoResponse> {
    let trade = state.db.get_trade(id)?.ok_or_else(|| AppError::NotFound("trade".into()))?;
    let outstanding_fields = validate_trade(&trade);
    let body = serde_json::to_string_pretty(&ContractSummary {
        trade_id: trade.id,
        contract_hash: trade.contract_hash.clone(),
        outstanding_fields,
    })
    .map_err(anyhow::Error::from)
    .map_err(AppError::Internal)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body))
}
