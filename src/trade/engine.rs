//! Trade Engine (C6): completeness validation, address selection, contract
//! freezing, signature collection, and milestone lifecycle tracking.

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::db::Db;
use crate::domain::Location;
use crate::error::AppError;
use crate::events::Event;
use crate::matching::geo::haversine_km;
use crate::negotiation::{Negotiation, NegotiationStatus};

use super::completeness::{validate, DraftTerms};
use super::contract::contract_hash;
use super::model::{Address, Signature, SignatorySide, Trade, TradeStatus, Milestone};

pub struct TradeEngine {
    db: Db,
}

impl TradeEngine {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Dry-run completeness check against already-accepted negotiation
    /// terms, without creating anything.
    pub fn validate_draft(&self, draft: &DraftTerms) -> Vec<String> {
        validate(draft)
    }

    pub fn create_from_negotiation(
        &self,
        negotiation: &Negotiation,
        draft: DraftTerms,
        buyer_branches: Vec<Location>,
        seller_branches: Vec<Location>,
        reference_state: &str,
        reference_lat: f64,
        reference_lng: f64,
    ) -> Result<Trade> {
        if negotiation.status != NegotiationStatus::Accepted {
            bail!(AppError::precondition("NEGOTIATION_NOT_ACCEPTED", "trade can only be created from an accepted negotiation"));
        }

        let missing = validate(&draft);
        if !missing.is_empty() {
            bail!(AppError::ValidationFields("trade terms incomplete".into(), missing));
        }

        let now = Utc::now();
        let buyer_eligible: Vec<Address> = buyer_branches.iter().map(location_to_address).collect();
        let seller_eligible: Vec<Address> = seller_branches.iter().map(location_to_address).collect();

        let needs_selection = buyer_branches.len() > 1 || seller_branches.len() > 1;
        let suggested_buyer = suggest_branch(&buyer_branches, reference_state, reference_lat, reference_lng);
        let suggested_seller = suggest_branch(&seller_branches, reference_state, reference_lat, reference_lng);

        let (ship_to, ship_from, status) = if needs_selection {
            (None, None, TradeStatus::PendingAddressSelection)
        } else {
            (
                suggested_buyer.map(location_to_address),
                suggested_seller.map(location_to_address),
                TradeStatus::Draft,
            )
        };

        let mut trade = Trade {
            id: Uuid::new_v4(),
            negotiation_id: negotiation.id,
            buyer_partner_id: negotiation.buyer_partner_id,
            seller_partner_id: negotiation.seller_partner_id,
            price_per_unit: draft.price_per_unit,
            total_quantity: draft.total_quantity,
            unit: draft.unit,
            total_amount: draft.total_amount,
            currency: draft.currency,
            ship_to,
            ship_from,
            buyer_eligible_branches: buyer_eligible,
            seller_eligible_branches: seller_eligible,
            delivery_date: draft.delivery_date,
            incoterm: draft.incoterm,
            transport_mode: draft.transport_mode,
            freight_responsibility: draft.freight_responsibility,
            payment: draft.payment,
            quality: draft.quality,
            inspection: draft.inspection,
            legal: draft.legal,
            penalties: draft.penalties,
            signatures: vec![],
            contract_hash: None,
            contract_pdf_ref: None,
            status,
            milestones: vec![],
            amendments: vec![],
            created_at: now,
            updated_at: now,
        };

        if trade.status == TradeStatus::Draft {
            self.freeze_and_render(&mut trade)?;
        }

        let suggestion_payload = if needs_selection {
            json!({
                "suggestedBuyerAddress": suggested_buyer.map(location_to_address),
                "suggestedSellerAddress": suggested_seller.map(location_to_address),
            })
        } else {
            json!({})
        };
        let event = self.event(&trade, "trade.created", suggestion_payload);
        self.db.upsert_trade_with_events(&trade, vec![event])?;
        Ok(trade)
    }

    pub fn confirm_addresses(&self, trade_id: Uuid, buyer_address: Option<Address>, seller_address: Option<Address>) -> Result<Trade> {
        let mut trade = self.load(trade_id)?;
        if trade.status != TradeStatus::PendingAddressSelection {
            bail!(AppError::precondition("NOT_PENDING_ADDRESS_SELECTION", "trade is not awaiting address selection"));
        }
        if let Some(addr) = buyer_address {
            trade.ship_to = Some(addr);
        }
        if let Some(addr) = seller_address {
            trade.ship_from = Some(addr);
        }
        if trade.ship_to.is_some() && trade.ship_from.is_some() {
            self.freeze_and_render(&mut trade)?;
        }
        trade.updated_at = Utc::now();
        let event = self.event(&trade, "trade.addresses_confirmed", json!({}));
        self.db.upsert_trade_with_events(&trade, vec![event])?;
        Ok(trade)
    }

    fn freeze_and_render(&self, trade: &mut Trade) -> Result<()> {
        trade.contract_hash = Some(contract_hash(trade)?);
        trade.contract_pdf_ref = Some(format!("contracts/{}.pdf", trade.id));
        trade.status = TradeStatus::PendingSignature;
        Ok(())
    }

    pub fn sign(&self, trade_id: Uuid, side: SignatorySide, signed_by_partner_id: Uuid) -> Result<Trade> {
        let mut trade = self.load(trade_id)?;
        if trade.status != TradeStatus::PendingSignature && trade.status != TradeStatus::Draft {
            bail!(AppError::precondition("NOT_SIGNABLE", "trade is not awaiting signatures"));
        }
        if trade.is_signed_by(side) {
            bail!(AppError::Conflict("this side has already signed".into()));
        }
        let expected_partner_id = match side {
            SignatorySide::Buyer => trade.buyer_partner_id,
            SignatorySide::Seller => trade.seller_partner_id,
        };
        if signed_by_partner_id != expected_partner_id {
            bail!(AppError::Authorization("signer is not the party on this side of the trade".into()));
        }

        let signature_hash = {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(trade.contract_hash.as_deref().unwrap_or_default().as_bytes());
            hasher.update(signed_by_partner_id.as_bytes());
            hex::encode(hasher.finalize())
        };

        trade.signatures.push(Signature {
            side,
            signed_by_partner_id,
            signed_at: Utc::now(),
            signature_hash,
        });

        if trade.is_fully_signed() {
            trade.status = TradeStatus::Active;
        }
        trade.updated_at = Utc::now();
        let mut events = vec![self.event(&trade, "trade.signed", json!({ "side": side }))];
        if trade.status == TradeStatus::Active {
            events.push(self.event(&trade, "trade.activated", json!({})));
        }
        self.db.upsert_trade_with_events(&trade, events)?;
        if trade.status == TradeStatus::Active {
            metrics::counter!("tradecore_trades_activated_total").increment(1);
        }
        Ok(trade)
    }

    pub fn add_milestone(&self, trade_id: Uuid, kind: impl Into<String>, note: Option<String>) -> Result<Trade> {
        let mut trade = self.load(trade_id)?;
        if trade.status != TradeStatus::Active
            && !matches!(
                trade.status,
                TradeStatus::InTransit | TradeStatus::Delivered | TradeStatus::QualityCheck
            )
        {
            bail!(AppError::precondition("TRADE_NOT_ACTIVE", "milestones can only be appended to an active trade"));
        }
        let milestone = Milestone {
            id: Uuid::new_v4(),
            kind: kind.into(),
            recorded_at: Utc::now(),
            note,
        };
        trade.milestones.push(milestone.clone());
        trade.updated_at = Utc::now();
        let event = self.event(&trade, "trade.milestone_recorded", json!({ "kind": milestone.kind }));
        self.db.upsert_trade_with_events(&trade, vec![event])?;
        Ok(trade)
    }

    fn load(&self, trade_id: Uuid) -> Result<Trade> {
        self.db.get_trade(trade_id)?.ok_or_else(|| AppError::NotFound("trade".into()).into())
    }

    /// Builds the event describing a trade state change; the caller persists
    /// it together with the write it describes via `upsert_trade_with_events`.
    fn event(&self, trade: &Trade, event_type: &str, extra: serde_json::Value) -> Event {
        let mut payload = json!({ "tradeId": trade.id, "status": trade.status });
        if let (serde_json::Value::Object(ref mut map), serde_json::Value::Object(extra_map)) = (&mut payload, extra) {
            map.extend(extra_map);
        }
        Event::new(event_type, 1, "trade", trade.id, None, Uuid::new_v4(), payload)
    }
}

fn location_to_address(loc: &Location) -> Address {
    Address::AdHoc {
        address: loc.address.clone(),
        city: loc.city.clone(),
        state: loc.state.clone(),
        pincode: loc.pincode.clone(),
    }
}

/// Branch suggestion order: same state, then shortest distance, then the
/// partner's default/primary address, then the first (head office stand-in).
fn suggest_branch<'a>(branches: &'a [Location], reference_state: &str, reference_lat: f64, reference_lng: f64) -> Option<&'a Location> {
    if branches.is_empty() {
        return None;
    }
    if let Some(same_state) = branches.iter().find(|b| b.state.eq_ignore_ascii_case(reference_state)) {
        return Some(same_state);
    }
    if let Some(nearest) = branches
        .iter()
        .min_by(|a, b| {
            let da = haversine_km(a.lat, a.lng, reference_lat, reference_lng);
            let db_ = haversine_km(b.lat, b.lng, reference_lat, reference_lng);
            da.partial_cmp(&db_).unwrap_or(std::cmp::Ordering::Equal)
        })
    {
        return Some(nearest);
    }
    if let Some(primary) = branches.iter().find(|b| b.is_primary) {
        return Some(primary);
    }
    branches.first()
}
