//! Capability-based authorization
//! Mission: authenticate a partner and check what they are allowed to do,
//! without ever asking what "role" they hold. See Design Notes: role-based
//! legacy is explicitly out; a partner can carry several capabilities.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Capability {
    Buy,
    Sell,
    Trade,
    Broker,
    Transport,
}

/// Claims embedded in a capability token: who the caller is acting as, and
/// what they are allowed to do. No role field — authorization checks
/// capabilities directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityClaims {
    pub sub: String, // partner id
    pub capabilities: Vec<Capability>,
    pub exp: usize,
}

impl CapabilityClaims {
    pub fn partner_id(&self) -> anyhow::Result<Uuid> {
        Ok(Uuid::parse_str(&self.sub)?)
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn has_any(&self, caps: &[Capability]) -> bool {
        caps.iter().any(|c| self.has(*c))
    }
}

pub struct CapabilityIssuer {
    secret: String,
    expiration_hours: i64,
}

impl CapabilityIssuer {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            expiration_hours: 12,
        }
    }

    pub fn issue(&self, partner_id: Uuid, capabilities: &[Capability]) -> anyhow::Result<String> {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(self.expiration_hours))
            .timestamp() as usize;
        let claims = CapabilityClaims {
            sub: partner_id.to_string(),
            capabilities: capabilities.to_vec(),
            exp,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> anyhow::Result<CapabilityClaims> {
        let decoded = decode::<CapabilityClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(decoded.claims)
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    MissingCapability(HashSet<Capability>),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing capability token".to_string()),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid or expired capability token".to_string()),
            AuthError::MissingCapability(caps) => (
                StatusCode::FORBIDDEN,
                format!("actor lacks required capability: {caps:?}"),
            ),
        };
        (status, message).into_response()
    }
}

/// Validates the capability token from `Authorization: Bearer` or a `?token=`
/// query param (so WebSocket upgrades, which cannot set headers from a
/// browser, still authenticate) and stashes the claims on the request.
pub async fn capability_middleware(
    State(issuer): State<Arc<CapabilityIssuer>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token_from_query = req.uri().query().and_then(|q| {
        q.split('&')
            .find(|pair| pair.starts_with("token="))
            .and_then(|pair| pair.split('=').nth(1))
            .map(|t| t.to_string())
    });

    let token_from_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    let token = token_from_header
        .or(token_from_query)
        .ok_or(AuthError::MissingToken)?;

    let claims = issuer
        .validate(&token)
        .map_err(|_| AuthError::InvalidToken)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn extract_claims(req: &Request) -> Option<&CapabilityClaims> {
    req.extensions().get::<CapabilityClaims>()
}

pub fn require(claims: &CapabilityClaims, caps: &[Capability]) -> Result<(), AuthError> {
    if claims.has_any(caps) {
        Ok(())
    } else {
        Err(AuthError::MissingCapability(caps.iter().copied().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_and_validates_roundtrip() {
        let issuer = CapabilityIssuer::new("test-secret".to_string());
        let partner = Uuid::new_v4();
        let token = issuer.issue(partner, &[Capability::Buy, Capability::Trade]).unwrap();
        let claims = issuer.validate(&token).unwrap();
        assert_eq!(claims.partner_id().unwrap(), partner);
        assert!(claims.has(Capability::Buy));
        assert!(!claims.has(Capability::Sell));
    }

    #[test]
    fn different_secret_rejects() {
        let a = CapabilityIssuer::new("secret-a".to_string());
        let b = CapabilityIssuer::new("secret-b".to_string());
        let token = a.issue(Uuid::new_v4(), &[Capability::Sell]).unwrap();
        assert!(b.validate(&token).is_err());
    }

    #[test]
    fn require_rejects_missing_capability() {
        let claims = CapabilityClaims {
            sub: Uuid::new_v4().to_string(),
            capabilities: vec![Capability::Buy],
            exp: usize::MAX,
        };
        assert!(require(&claims, &[Capability::Sell]).is_err());
        assert!(require(&claims, &[Capability::Buy, Capability::Sell]).is_ok());
    }
}
