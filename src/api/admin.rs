//! Read-only supervisory views, gated on the broker capability: a human
//! overseeing negotiations they are not a party to.

use axum::extract::{Extension, Path, State};
use axum::Json;
use uuid::Uuid;

use crate::capability::{Capability, CapabilityClaims};
use crate::error::{AppError, AppResult};
use crate::negotiation::Negotiation;

use super::state::AppState;

pub async fn list_negotiations(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
) -> AppResult<Json<Vec<Negotiation>>> {
    require_broker(&claims)?;
    Ok(Json(state.db.all_negotiations()?))
}

pub async fn get_negotiation(
    State(state): State<AppState>,
    Extension(claims): Extension<CapabilityClaims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Negotiation>> {
    require_broker(&claims)?;
    Ok(Json(state.db.get_negotiation(id)?.ok_or_else(|| AppError::NotFound("negotiation".into()))?))
}

fn require_broker(claims: &CapabilityClaims) -> AppResult<()> {
    if !claims.has(Capability::Broker) {
        return Err(AppError::Authorization("broker capability required".into()));
    }
    Ok(())
}
