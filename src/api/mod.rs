//! HTTP surface: one module per resource, a shared `AppState`, and the
//! router assembly the teacher's `main.rs` used to do inline, now split out
//! so each resource's handlers read top to bottom.

pub mod admin;
pub mod availabilities;
pub mod negotiations;
pub mod requirements;
pub mod state;
pub mod trades;

use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{middleware, Router};

use crate::capability::capability_middleware;
use crate::idempotency::idempotency_middleware;

use self::state::AppState;

/// Search endpoints are deliberately absent from this core; the full-text
/// discovery surface lives in a separate service. Legacy clients still
/// pointed at the old in-process search paths get a migration pointer
/// instead of a silent 404.
async fn legacy_search_gone() -> (StatusCode, &'static str) {
    (StatusCode::GONE, "search has moved to the discovery service; this path is no longer served here")
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/requirements", post(requirements::create))
        .route("/requirements/:id", patch(requirements::patch))
        .route("/requirements/:id/publish", post(requirements::publish))
        .route("/requirements/:id/cancel", post(requirements::cancel))
        .route("/requirements/:id/ai-adjust", post(requirements::ai_adjust))
        .route("/requirements/:id/fulfillment", post(requirements::fulfillment))
        .route("/availabilities", post(availabilities::create))
        .route("/availabilities/:id", patch(availabilities::patch))
        .route("/availabilities/:id/approve", post(availabilities::approve))
        .route("/availabilities/:id/reserve", post(availabilities::reserve))
        .route("/availabilities/:id/release", post(availabilities::release))
        .route("/availabilities/:id/mark-sold", post(availabilities::mark_sold))
        .route("/negotiations", get(negotiations::list_for_caller))
        .route("/negotiations/start", post(negotiations::start))
        .route("/negotiations/:id", get(negotiations::get))
        .route("/negotiations/:id/offer", post(negotiations::make_offer))
        .route("/negotiations/:id/accept", post(negotiations::accept))
        .route("/negotiations/:id/reject", post(negotiations::reject))
        .route("/negotiations/:id/messages", get(negotiations::list_messages).post(negotiations::send_message))
        .route("/negotiations/:id/ai-suggest", post(negotiations::ai_suggest))
        .route("/trades/validate/:negotiationId", post(trades::validate_negotiation))
        .route("/trades", post(trades::create))
        .route("/trades/:id", get(trades::get))
        .route("/trades/:id/confirm-addresses", post(trades::confirm_addresses))
        .route("/trades/:id/sign", post(trades::sign))
        .route("/trades/:id/contract.pdf", get(trades::contract))
        .route("/admin/negotiations", get(admin::list_negotiations))
        .route("/admin/negotiations/:id", get(admin::get_negotiation))
        // idempotency runs closest to the handler so a cached replay never
        // bypasses the capability check on a fresh, differently-authorized
        // request presenting the same key.
        .layer(middleware::from_fn_with_state(state.clone(), idempotency_middleware))
        .layer(middleware::from_fn_with_state(state.capabilities.clone(), capability_middleware));

    Router::new()
        .route("/search", axum::routing::any(legacy_search_gone))
        .route("/search/*rest", axum::routing::any(legacy_search_gone))
        .merge(protected)
        .with_state(state)
}
