//! Match Token Store (C4): anonymized handles that reveal counterparty
//! identity only as a negotiation actually engages.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Db;
use crate::error::AppError;

use super::scoring::ScoreBreakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisclosureLevel {
    Anon,
    Engaged,
    Trade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchToken {
    pub id: Uuid,
    pub requirement_id: Uuid,
    pub availability_id: Uuid,
    pub anonymous_token_buyer: String,
    pub anonymous_token_seller: String,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub disclosure_level: DisclosureLevel,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Used for the matching engine's 15-minute re-emit suppression window;
    /// not part of the public contract.
    pub dedup_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub enum TokenSide {
    Buyer,
    Seller,
}

/// A handle holder's redacted view: full detail on their own side, nothing
/// about the counterparty until `disclosure_level` advances.
#[derive(Debug, Clone, Serialize)]
pub struct MatchTokenView {
    pub token_id: Uuid,
    pub requirement_id: Uuid,
    pub availability_id: Uuid,
    pub side: TokenSide,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub disclosure_level: DisclosureLevel,
    pub counterparty_partner_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
}

fn random_handle() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct MatchTokenStore {
    db: Db,
    default_expiry: Duration,
}

impl MatchTokenStore {
    pub fn new(db: Db, default_expiry_hours: i64) -> Self {
        Self {
            db,
            default_expiry: Duration::hours(default_expiry_hours),
        }
    }

    pub fn issue(
        &self,
        requirement_id: Uuid,
        availability_id: Uuid,
        score_breakdown: ScoreBreakdown,
        dedup_key: String,
    ) -> Result<MatchToken> {
        let token = self.build(requirement_id, availability_id, score_breakdown, dedup_key);
        self.db.insert_match_token(&token)?;
        Ok(token)
    }

    /// Builds and persists the token atomically with the event describing
    /// it, so a crash between the write and the event append can never
    /// leave a token with no `match.found` record in the log.
    pub fn issue_with_event(
        &self,
        requirement_id: Uuid,
        availability_id: Uuid,
        score_breakdown: ScoreBreakdown,
        dedup_key: String,
        build_event: impl FnOnce(&MatchToken) -> crate::events::Event,
    ) -> Result<MatchToken> {
        let token = self.build(requirement_id, availability_id, score_breakdown, dedup_key);
        let event = build_event(&token);
        self.db.insert_match_token_with_event(&token, event)?;
        Ok(token)
    }

    fn build(&self, requirement_id: Uuid, availability_id: Uuid, score_breakdown: ScoreBreakdown, dedup_key: String) -> MatchToken {
        let now = Utc::now();
        MatchToken {
            id: Uuid::new_v4(),
            requirement_id,
            availability_id,
            anonymous_token_buyer: random_handle(),
            anonymous_token_seller: random_handle(),
            score: score_breakdown.total,
            score_breakdown,
            disclosure_level: DisclosureLevel::Anon,
            created_at: now,
            expires_at: now + self.default_expiry,
            dedup_key,
        }
    }

    /// Resolves a handle to its side-specific view. Presenting the wrong
    /// side's handle for the counterparty's own actor id is rejected, and a
    /// handle used to probe for the other side's identity never reveals it
    /// before `reveal` has raised disclosure.
    pub fn resolve(&self, handle: &str, requesting_partner_id: Uuid, buyer_partner_id: Uuid, seller_partner_id: Uuid) -> Result<MatchTokenView> {
        let Some(token) = self.db.find_match_token_by_handle(handle)? else {
            bail!(AppError::NotFound("match token".into()));
        };
        if token.expires_at < Utc::now() {
            bail!(AppError::Precondition("TOKEN_EXPIRED", "match token has expired".into()));
        }

        let side = if handle == token.anonymous_token_buyer {
            TokenSide::Buyer
        } else if handle == token.anonymous_token_seller {
            TokenSide::Seller
        } else {
            bail!(AppError::NotFound("match token".into()));
        };

        let owner_matches = match side {
            TokenSide::Buyer => requesting_partner_id == buyer_partner_id,
            TokenSide::Seller => requesting_partner_id == seller_partner_id,
        };
        if !owner_matches {
            bail!(AppError::Authorization("handle does not belong to this partner".into()));
        }

        let counterparty_partner_id = match (token.disclosure_level, &side) {
            (DisclosureLevel::Anon, _) => None,
            (_, TokenSide::Buyer) => Some(seller_partner_id),
            (_, TokenSide::Seller) => Some(buyer_partner_id),
        };

        Ok(MatchTokenView {
            token_id: token.id,
            requirement_id: token.requirement_id,
            availability_id: token.availability_id,
            side,
            score: token.score,
            score_breakdown: token.score_breakdown,
            disclosure_level: token.disclosure_level,
            counterparty_partner_id,
            expires_at: token.expires_at,
        })
    }

    /// Raises disclosure when a negotiation successfully starts from this
    /// token (ENGAGED) or when it culminates in a trade (TRADE).
    pub fn reveal(&self, token_id: Uuid, level: DisclosureLevel) -> Result<MatchToken> {
        let Some(mut token) = self.db.find_match_token_by_id(token_id)? else {
            bail!(AppError::NotFound("match token".into()));
        };
        token.disclosure_level = level;
        self.db.update_match_token_disclosure(&token)?;
        Ok(token)
    }

    pub fn recently_emitted_dedup_keys(&self, window_secs: i64) -> Result<Vec<String>> {
        self.db.recent_dedup_keys(window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::scoring::ScoreBreakdown;

    fn breakdown() -> ScoreBreakdown {
        ScoreBreakdown {
            quality: 1.0,
            price: 1.0,
            quantity: 1.0,
            location: 1.0,
            timeline: 1.0,
            risk: 1.0,
            warn_penalty_applied: false,
            ai_boost_applied: false,
            total: 1.0,
        }
    }

    #[test]
    fn issue_and_resolve_respects_ownership() {
        let store = MatchTokenStore::new(Db::open(":memory:").unwrap(), 24);
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let token = store
            .issue(Uuid::new_v4(), Uuid::new_v4(), breakdown(), "dedup".into())
            .unwrap();

        let view = store
            .resolve(&token.anonymous_token_buyer, buyer, buyer, seller)
            .unwrap();
        assert!(view.counterparty_partner_id.is_none());

        let err = store.resolve(&token.anonymous_token_buyer, seller, buyer, seller);
        assert!(err.is_err());
    }

    #[test]
    fn cross_side_handle_rejected() {
        let store = MatchTokenStore::new(Db::open(":memory:").unwrap(), 24);
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let token = store
            .issue(Uuid::new_v4(), Uuid::new_v4(), breakdown(), "dedup".into())
            .unwrap();
        // seller presenting the buyer's handle is rejected even though
        // seller is a legitimate participant on the other handle.
        let err = store.resolve(&token.anonymous_token_buyer, seller, buyer, seller);
        assert!(err.is_err());
    }
}
