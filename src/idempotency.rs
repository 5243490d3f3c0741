//! `Idempotency-Key` contract for the mutating endpoints: replay an
//! identical request within the TTL window byte-for-byte, reject a key
//! reused with a different body.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::api::state::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub async fn idempotency_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(key) = req
        .headers()
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
    else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };
    let fingerprint = fingerprint_of(&parts.uri.to_string(), &bytes);

    match state.db.get_idempotent(&key) {
        Ok(Some((stored_fingerprint, body, status))) => {
            if stored_fingerprint != fingerprint {
                return (
                    StatusCode::CONFLICT,
                    [("content-type", "application/json")],
                    serde_json::json!({
                        "code": "idempotency_key_conflict",
                        "detail": "this idempotency key was already used with a different request body",
                    })
                    .to_string(),
                )
                    .into_response();
            }
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            return (status, body).into_response();
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "idempotency store lookup failed");
        }
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(req).await;

    let status = response.status();
    if status.is_success() {
        let (resp_parts, resp_body) = response.into_parts();
        if let Ok(body_bytes) = to_bytes(resp_body, MAX_BODY_BYTES).await {
            if let Ok(body_str) = std::str::from_utf8(&body_bytes) {
                if let Err(e) = state.db.put_idempotent(&key, &fingerprint, body_str, status.as_u16()) {
                    tracing::error!(error = %e, "idempotency store write failed");
                }
            }
            return Response::from_parts(resp_parts, Body::from(body_bytes));
        }
        return Response::from_parts(resp_parts, Body::empty());
    }
    response
}

fn fingerprint_of(path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}
