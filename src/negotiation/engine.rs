//! Negotiation Engine (C5): the alternating-offer state machine. Each
//! negotiation is a single aggregate; every mutating call here is meant to
//! run under that aggregate's lock (see `NegotiationLocks`), reads do not.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::db::Db;
use crate::error::AppError;
use crate::events::Event;
use crate::matching::{DisclosureLevel, MatchTokenStore};

use super::model::{
    MessageSender, Negotiation, NegotiationMessage, NegotiationOffer, NegotiationStatus, OfferStatus, Side,
};

/// Per-negotiation mutual-exclusion: cross-negotiation operations never
/// acquire more than one of these at a time.
#[derive(Default)]
pub struct NegotiationLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl NegotiationLocks {
    pub fn lock_for(&self, negotiation_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(negotiation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct NegotiationEngine {
    db: Db,
    tokens: Arc<MatchTokenStore>,
    locks: NegotiationLocks,
    default_expiry: Duration,
}

impl NegotiationEngine {
    pub fn new(db: Db, tokens: Arc<MatchTokenStore>, default_expiry_hours: i64) -> Self {
        Self {
            db,
            tokens,
            locks: NegotiationLocks::default(),
            default_expiry: Duration::hours(default_expiry_hours),
        }
    }

    pub fn start(
        &self,
        match_token_id: Uuid,
        requirement_id: Uuid,
        availability_id: Uuid,
        buyer_partner_id: Uuid,
        seller_partner_id: Uuid,
        initial_price: f64,
        initial_quantity: f64,
        initial_message: Option<String>,
    ) -> Result<Negotiation> {
        if self.db.negotiation_for_token(match_token_id)?.is_some() {
            bail!(AppError::Conflict("negotiation already exists for this match token".into()));
        }

        let now = Utc::now();
        let negotiation = Negotiation {
            id: Uuid::new_v4(),
            match_token_id,
            requirement_id,
            availability_id,
            buyer_partner_id,
            seller_partner_id,
            status: NegotiationStatus::Initiated,
            current_round: 0,
            current_price_per_unit: initial_price,
            current_quantity: initial_quantity,
            last_offer_by: None,
            initiated_at: now,
            last_activity_at: now,
            expires_at: now + self.default_expiry,
            accepted_by: None,
            rejected_by: None,
            rejection_reason: None,
            trade_id: None,
            ai_suggestions_enabled: true,
            auto_negotiate_buyer: false,
            auto_negotiate_seller: false,
        };
        self.tokens.reveal(match_token_id, DisclosureLevel::Engaged)?;

        let event = self.event(&negotiation, "negotiation.started", json!({}));
        match initial_message {
            Some(content) => {
                let message = NegotiationMessage {
                    id: Uuid::new_v4(),
                    negotiation_id: negotiation.id,
                    sender: MessageSender::System,
                    content,
                    message_type: "text".into(),
                    read_by_buyer_at: None,
                    read_by_seller_at: None,
                };
                self.db.negotiation_message_with_events(&negotiation, &message, vec![event])?;
            }
            None => {
                self.db.upsert_negotiation_with_events(&negotiation, vec![event])?;
            }
        }
        Ok(negotiation)
    }

    pub fn make_offer(
        &self,
        negotiation_id: Uuid,
        actor_partner_id: Uuid,
        price_per_unit: f64,
        quantity: f64,
        delivery_terms: Option<String>,
        payment_terms: Option<String>,
        quality_conditions: Option<String>,
        message: Option<String>,
    ) -> Result<(Negotiation, NegotiationOffer)> {
        let _guard = self.locks.lock_for(negotiation_id);
        let mut negotiation = self.load(negotiation_id)?;
        self.guard_not_terminal_or_expired(&negotiation)?;

        let actor_side = negotiation
            .side_of(actor_partner_id)
            .ok_or_else(|| AppError::Authorization("not a participant in this negotiation".into()))?;

        if let Some(last_offer_by) = negotiation.last_offer_by {
            if last_offer_by == actor_side {
                bail!(AppError::precondition(
                    "ALTERNATION_VIOLATED",
                    "the same side cannot make two consecutive offers"
                ));
            }
        }
        if price_per_unit <= 0.0 || quantity <= 0.0 {
            bail!(AppError::Validation("price and quantity must be positive".into()));
        }

        // at most one PENDING offer per negotiation: supersede the prior one
        let mut superseded = Vec::new();
        for mut prior in self.db.offers_for_negotiation(negotiation_id)? {
            if prior.status == OfferStatus::Pending {
                prior.status = OfferStatus::Countered;
                prior.responded_at = Some(Utc::now());
                superseded.push(prior);
            }
        }

        let offer = NegotiationOffer {
            id: Uuid::new_v4(),
            negotiation_id,
            round_number: negotiation.current_round + 1,
            offered_by: actor_side,
            price_per_unit,
            quantity,
            delivery_terms,
            payment_terms,
            quality_conditions,
            message,
            ai_generated: false,
            ai_confidence: None,
            ai_reasoning: None,
            status: OfferStatus::Pending,
            responded_at: None,
            response_message: None,
        };
        negotiation.status = NegotiationStatus::InProgress;
        negotiation.current_round = offer.round_number;
        negotiation.current_price_per_unit = price_per_unit;
        negotiation.current_quantity = quantity;
        negotiation.last_offer_by = Some(actor_side);
        negotiation.last_activity_at = Utc::now();

        let event = self.event(
            &negotiation,
            "negotiation.offer_made",
            json!({ "offerId": offer.id, "roundNumber": offer.round_number }),
        );
        self.db.negotiation_offer_with_events(&negotiation, &superseded, &offer, vec![event])?;
        Ok((negotiation, offer))
    }

    pub fn accept(&self, negotiation_id: Uuid, actor_partner_id: Uuid, message: Option<String>) -> Result<Negotiation> {
        let _guard = self.locks.lock_for(negotiation_id);
        let mut negotiation = self.load(negotiation_id)?;
        self.guard_not_terminal_or_expired(&negotiation)?;

        let actor_side = negotiation
            .side_of(actor_partner_id)
            .ok_or_else(|| AppError::Authorization("not a participant in this negotiation".into()))?;

        let offers = self.db.offers_for_negotiation(negotiation_id)?;
        let mut pending = offers
            .into_iter()
            .find(|o| o.status == OfferStatus::Pending)
            .ok_or_else(|| AppError::precondition("NO_ACTIVE_OFFER", "no active counter-offer to accept"))?;

        if pending.offered_by == actor_side {
            bail!(AppError::Authorization("the offerer cannot accept their own offer".into()));
        }

        pending.status = OfferStatus::Accepted;
        pending.responded_at = Some(Utc::now());
        pending.response_message = message;

        negotiation.status = NegotiationStatus::Accepted;
        negotiation.accepted_by = Some(actor_side);
        negotiation.last_activity_at = Utc::now();

        let event = self.event(&negotiation, "negotiation.accepted", json!({ "offerId": pending.id }));
        self.db.negotiation_transition_with_events(&negotiation, Some(&pending), vec![event])?;
        self.tokens.reveal(negotiation.match_token_id, DisclosureLevel::Trade)?;
        metrics::counter!("tradecore_negotiation_transitions_total", "status" => "ACCEPTED").increment(1);
        Ok(negotiation)
    }

    pub fn reject(
        &self,
        negotiation_id: Uuid,
        actor_partner_id: Uuid,
        reason: String,
        counter: Option<(f64, f64)>,
    ) -> Result<Negotiation> {
        {
            let _guard = self.locks.lock_for(negotiation_id);
            let mut negotiation = self.load(negotiation_id)?;
            self.guard_not_terminal_or_expired(&negotiation)?;

            let actor_side = negotiation
                .side_of(actor_partner_id)
                .ok_or_else(|| AppError::Authorization("not a participant in this negotiation".into()))?;

            let offers = self.db.offers_for_negotiation(negotiation_id)?;
            let mut rejected_offer = None;
            if let Some(mut pending) = offers.into_iter().find(|o| o.status == OfferStatus::Pending) {
                if pending.offered_by == actor_side {
                    bail!(AppError::Authorization("the offerer cannot reject their own offer".into()));
                }
                pending.status = OfferStatus::Rejected;
                pending.responded_at = Some(Utc::now());
                pending.response_message = Some(reason.clone());
                rejected_offer = Some(pending);
            }

            if counter.is_none() {
                negotiation.status = NegotiationStatus::Rejected;
                negotiation.rejected_by = Some(actor_side);
                negotiation.rejection_reason = Some(reason);
                negotiation.last_activity_at = Utc::now();
                let event = self.event(&negotiation, "negotiation.rejected", json!({}));
                self.db.negotiation_transition_with_events(&negotiation, rejected_offer.as_ref(), vec![event])?;
                metrics::counter!("tradecore_negotiation_transitions_total", "status" => "REJECTED").increment(1);
                return Ok(negotiation);
            }

            if let Some(offer) = rejected_offer {
                self.db.reject_offer_pending_counter(&offer)?;
            }
        }

        let (price, quantity) = counter.unwrap();
        let (negotiation, _) = self.make_offer(negotiation_id, actor_partner_id, price, quantity, None, None, None, None)?;
        Ok(negotiation)
    }

    pub fn send_message(
        &self,
        negotiation_id: Uuid,
        actor_partner_id: Uuid,
        content: String,
        message_type: String,
    ) -> Result<NegotiationMessage> {
        let _guard = self.locks.lock_for(negotiation_id);
        let mut negotiation = self.load(negotiation_id)?;
        if negotiation.status.is_terminal() {
            bail!(AppError::precondition("NEGOTIATION_TERMINAL", "negotiation is no longer active"));
        }
        let actor_side = negotiation
            .side_of(actor_partner_id)
            .ok_or_else(|| AppError::Authorization("not a participant in this negotiation".into()))?;

        let message = NegotiationMessage {
            id: Uuid::new_v4(),
            negotiation_id,
            sender: match actor_side {
                Side::Buyer => MessageSender::Buyer,
                Side::Seller => MessageSender::Seller,
            },
            content,
            message_type,
            read_by_buyer_at: None,
            read_by_seller_at: None,
        };
        negotiation.last_activity_at = Utc::now();
        let event = self.event(&negotiation, "negotiation.message_sent", json!({ "messageId": message.id }));
        self.db.negotiation_message_with_events(&negotiation, &message, vec![event])?;
        Ok(message)
    }

    /// Periodic sweeper: every non-terminal negotiation past `expires_at`
    /// transitions to EXPIRED with a system message.
    pub fn expire_inactive(&self) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let due = self.db.non_terminal_negotiations_past(&now.to_rfc3339())?;
        let mut expired_ids = Vec::new();
        for mut negotiation in due {
            let _guard = self.locks.lock_for(negotiation.id);
            negotiation.status = NegotiationStatus::Expired;
            negotiation.last_activity_at = now;
            let message = NegotiationMessage {
                id: Uuid::new_v4(),
                negotiation_id: negotiation.id,
                sender: MessageSender::System,
                content: "negotiation expired due to inactivity".into(),
                message_type: "system".into(),
                read_by_buyer_at: None,
                read_by_seller_at: None,
            };
            let event = self.event(&negotiation, "negotiation.expired", json!({}));
            self.db.negotiation_message_with_events(&negotiation, &message, vec![event])?;
            metrics::counter!("tradecore_negotiation_transitions_total", "status" => "EXPIRED").increment(1);
            expired_ids.push(negotiation.id);
        }
        Ok(expired_ids)
    }

    fn load(&self, negotiation_id: Uuid) -> Result<Negotiation> {
        self.db
            .get_negotiation(negotiation_id)?
            .ok_or_else(|| AppError::NotFound("negotiation".into()).into())
    }

    fn guard_not_terminal_or_expired(&self, negotiation: &Negotiation) -> Result<()> {
        if negotiation.status.is_terminal() {
            bail!(AppError::precondition("NEGOTIATION_TERMINAL", "negotiation is no longer active"));
        }
        if negotiation.expires_at < Utc::now() {
            bail!(AppError::precondition("NEGOTIATION_EXPIRED", "negotiation has expired"));
        }
        Ok(())
    }

    /// Builds the event describing a negotiation state change; the caller
    /// persists it together with the write it describes.
    fn event(&self, negotiation: &Negotiation, event_type: &str, extra: serde_json::Value) -> Event {
        let mut payload = json!({
            "negotiationId": negotiation.id,
            "matchTokenId": negotiation.match_token_id,
            "status": negotiation.status,
        });
        if let serde_json::Value::Object(ref mut map) = payload {
            if let serde_json::Value::Object(extra_map) = extra {
                map.extend(extra_map);
            }
        }
        Event::new(event_type, 1, "negotiation", negotiation.id, None, Uuid::new_v4(), payload)
    }
}
