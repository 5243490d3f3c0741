//! End-to-end scenario tests driving the engines directly, the way the
//! HTTP handlers in `src/api/` do, without going through axum.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use tradecore::db::Db;
use tradecore::domain::quality::QualityParamType;
use tradecore::domain::requirement::{DeliveryLocation, IntentType, MarketVisibility};
use tradecore::domain::{
    ApprovalStatus, Availability, AvailabilityIntent, AvailabilityStatus, Commodity, QualityParamSpec,
    QualityValue, Requirement, RequirementStatus, RiskState,
};
use tradecore::events::EventLog;
use tradecore::matching::MatchQueue;
use tradecore::matching::MatchingEngine;
use tradecore::matching::MatchTokenStore;
use tradecore::negotiation::{NegotiationEngine, Side};
use tradecore::risk::RiskEvaluator;
use tradecore::trade::completeness::DraftTerms;
use tradecore::trade::model::{
    BalanceTrigger, InspectionTerms, LegalTerms, PaymentTerms, PenaltyTerms, QualityTerms, SignatorySide,
};
use tradecore::trade::{contract_hash, TradeEngine, TradeStatus};

fn cotton_commodity() -> Commodity {
    let mut schema = HashMap::new();
    schema.insert(
        "moisture".to_string(),
        QualityParamSpec { param_type: QualityParamType::Number, min: Some(0.0), max: Some(15.0), mandatory: true, tolerance: Some(1.0) },
    );
    schema.insert(
        "trash".to_string(),
        QualityParamSpec { param_type: QualityParamType::Number, min: Some(0.0), max: Some(5.0), mandatory: true, tolerance: Some(0.5) },
    );
    schema.insert(
        "staple".to_string(),
        QualityParamSpec { param_type: QualityParamType::Number, min: Some(20.0), max: Some(40.0), mandatory: false, tolerance: Some(1.0) },
    );
    Commodity {
        id: Uuid::new_v4(),
        name: "Cotton Shankar-6".into(),
        variety: Some("Shankar-6".into()),
        default_trade_unit: "quintal".into(),
        default_rate_unit: "quintal".into(),
        default_base_unit: "kg".into(),
        quality_schema: schema,
    }
}

fn quality_spec() -> HashMap<String, QualityValue> {
    let mut spec = HashMap::new();
    spec.insert("moisture".to_string(), QualityValue::Exact { value: 8.0, tolerance: Some(1.0) });
    spec.insert("trash".to_string(), QualityValue::Exact { value: 2.5, tolerance: Some(0.5) });
    spec.insert("staple".to_string(), QualityValue::Exact { value: 28.0, tolerance: Some(1.0) });
    spec
}

fn requirement(buyer: Uuid, commodity_id: Uuid) -> Requirement {
    let now = Utc::now();
    Requirement {
        id: Uuid::new_v4(),
        buyer_partner_id: buyer,
        buyer_branch_location_id: None,
        commodity_id,
        quantity: 50.0,
        unit: "quintal".into(),
        preferred_price: 7100.0,
        max_price: 7300.0,
        quality_spec: quality_spec(),
        delivery_location: DeliveryLocation::AdHoc {
            address: "Ahmedabad".into(),
            lat: 23.03,
            lng: 72.58,
            region: "GJ".into(),
            pincode: "380001".into(),
        },
        delivery_window_start: now,
        delivery_window_end: now + Duration::days(7),
        intent_type: IntentType::Negotiation,
        market_visibility: MarketVisibility::Public,
        invited_seller_ids: vec![],
        urgency: 1,
        eod_cutoff: now + Duration::days(7),
        status: RequirementStatus::Draft,
        version: 0,
        risk_state: RiskState::Pending,
        embedding: None,
    }
}

fn availability(seller: Uuid, commodity_id: Uuid) -> Availability {
    let now = Utc::now();
    Availability {
        id: Uuid::new_v4(),
        seller_partner_id: seller,
        seller_branch_location_id: None,
        commodity_id,
        total_quantity: 50.0,
        available_quantity: 50.0,
        reserved_quantity: 0.0,
        sold_quantity: 0.0,
        unit: "quintal".into(),
        asking_price: 7150.0,
        allow_partial_order: true,
        min_order_quantity: 1.0,
        quality_spec: quality_spec(),
        delivery_location: DeliveryLocation::AdHoc {
            address: "Ahmedabad".into(),
            lat: 23.03,
            lng: 72.58,
            region: "GJ".into(),
            pincode: "380001".into(),
        },
        delivery_window_start: now,
        delivery_window_end: now + Duration::days(7),
        intent_type: AvailabilityIntent::Spot,
        market_visibility: MarketVisibility::Public,
        invited_buyer_ids: vec![],
        approval_status: ApprovalStatus::Approved,
        eod_cutoff: now + Duration::days(7),
        status: AvailabilityStatus::Active,
        version: 0,
        risk_state: RiskState::Pending,
        embedding: None,
    }
}

struct Harness {
    db: Db,
    matching: MatchingEngine,
    negotiation: NegotiationEngine,
    trade: TradeEngine,
    tokens: Arc<MatchTokenStore>,
}

fn harness() -> Harness {
    let db = Db::open(":memory:").unwrap();
    let events = Arc::new(EventLog::new(db.clone()));
    let risk = Arc::new(RiskEvaluator::with_noop_ml());
    let tokens = Arc::new(MatchTokenStore::new(db.clone(), 48));
    let (match_queue, _match_queue_rx) = MatchQueue::new(16, 16, 16);
    let matching = MatchingEngine::new(
        db.clone(),
        events.clone(),
        risk,
        tokens.clone(),
        Arc::new(match_queue),
        500.0,
        30,
    );
    let negotiation = NegotiationEngine::new(db.clone(), tokens.clone(), 48);
    let trade = TradeEngine::new(db.clone());
    Harness { db, matching, negotiation, trade, tokens }
}

fn complete_draft(price: f64, quantity: f64) -> DraftTerms {
    let mut quality_params = HashMap::new();
    quality_params.insert("moisture".to_string(), QualityValue::Exact { value: 8.0, tolerance: Some(1.0) });
    DraftTerms {
        price_per_unit: price,
        total_quantity: quantity,
        unit: "quintal".into(),
        total_amount: price * quantity,
        currency: "INR".into(),
        delivery_date: Utc::now() + Duration::days(10),
        incoterm: "EXW".into(),
        transport_mode: "road".into(),
        freight_responsibility: "BUYER".into(),
        payment: PaymentTerms {
            method: "bank_transfer".into(),
            advance_pct: 20.0,
            advance_due_days: 2,
            balance_trigger: BalanceTrigger::OnDelivery,
            balance_due_days: 7,
            late_penalty_pct_per_month: 1.5,
        },
        quality: QualityTerms { parameters: quality_params, testing_method: "NABL lab".into(), tolerance: 1.0 },
        inspection: InspectionTerms {
            agency: "SGS".into(),
            location: "warehouse".into(),
            timeline_days: 2,
            rejection_terms: "full reject on fail".into(),
        },
        legal: LegalTerms {
            governing_law: "India".into(),
            jurisdiction: "Ahmedabad".into(),
            dispute_resolution_method: "arbitration".into(),
            dispute_resolution_venue: "Ahmedabad".into(),
            force_majeure_clause: "standard force majeure".into(),
        },
        penalties: PenaltyTerms {
            late_delivery_rate_pct: 0.5,
            late_delivery_cap_pct: 5.0,
            late_delivery_grace_days: 2,
            quality_rejection_terms: "pro-rata".into(),
            buyer_cancellation_terms: "forfeits advance".into(),
            seller_cancellation_terms: "2x advance penalty".into(),
        },
    }
}

/// S1: happy path end to end — requirement + availability match, negotiate
/// to a price, accept, create the trade, both sides sign, contract hash is
/// stable under recomputation.
#[test]
fn s1_happy_path_from_match_to_active_trade() {
    let h = harness();
    let commodity = cotton_commodity();
    h.db.upsert_commodity(&commodity).unwrap();

    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let mut req = requirement(buyer, commodity.id);
    req.risk_state = RiskState::Pass;
    req.status = RequirementStatus::Active;
    h.db.upsert_requirement(&req).unwrap();

    let mut avail = availability(seller, commodity.id);
    avail.risk_state = RiskState::Pass;
    h.db.upsert_availability(&avail).unwrap();

    let outcome = h.matching.match_requirement(&req, &commodity).unwrap();
    assert_eq!(outcome.tokens.len(), 1, "exactly one match token expected");
    let token = &outcome.tokens[0];
    assert!(token.score >= 0.85, "expected score >= 0.85, got {}", token.score);

    let negotiation = h
        .negotiation
        .start(token.id, req.id, avail.id, buyer, seller, 7100.0, 50.0, None)
        .unwrap();

    let (negotiation, _offer) = h
        .negotiation
        .make_offer(negotiation.id, buyer, 7100.0, 50.0, None, None, None, None)
        .unwrap();
    let (negotiation, _offer) = h
        .negotiation
        .make_offer(negotiation.id, seller, 7200.0, 50.0, None, None, None, None)
        .unwrap();
    let (negotiation, _offer) = h
        .negotiation
        .make_offer(negotiation.id, buyer, 7150.0, 50.0, None, None, None, None)
        .unwrap();
    let negotiation = h.negotiation.accept(negotiation.id, seller, None).unwrap();
    assert_eq!(negotiation.accepted_by, Some(Side::Seller));

    let buyer_branch = tradecore::domain::Location {
        id: Uuid::new_v4(),
        partner_id: buyer,
        address: "B-1".into(),
        city: "Ahmedabad".into(),
        state: "GJ".into(),
        pincode: "380001".into(),
        lat: 23.03,
        lng: 72.58,
        region: "GJ".into(),
        is_primary: true,
    };
    let seller_branch = tradecore::domain::Location {
        id: Uuid::new_v4(),
        partner_id: seller,
        address: "S-1".into(),
        city: "Ahmedabad".into(),
        state: "GJ".into(),
        pincode: "380002".into(),
        lat: 23.04,
        lng: 72.59,
        region: "GJ".into(),
        is_primary: true,
    };

    let draft = complete_draft(7150.0, 50.0);
    let trade = h
        .trade
        .create_from_negotiation(&negotiation, draft, vec![buyer_branch], vec![seller_branch], "GJ", 23.03, 72.58)
        .unwrap();
    assert_eq!(trade.status, TradeStatus::PendingSignature);
    let stored_hash = trade.contract_hash.clone().unwrap();

    let trade = h.trade.sign(trade.id, SignatorySide::Buyer, buyer).unwrap();
    assert_eq!(trade.status, TradeStatus::PendingSignature);
    let trade = h.trade.sign(trade.id, SignatorySide::Seller, seller).unwrap();
    assert_eq!(trade.status, TradeStatus::Active);

    let recomputed = contract_hash(&trade).unwrap();
    assert_eq!(recomputed, stored_hash, "contract hash must be stable under recomputation");
}

/// S2: a partner cannot match against themselves.
#[test]
fn s2_self_match_blocked() {
    let h = harness();
    let commodity = cotton_commodity();
    h.db.upsert_commodity(&commodity).unwrap();

    let partner = Uuid::new_v4();
    let mut req = requirement(partner, commodity.id);
    req.risk_state = RiskState::Pass;
    req.status = RequirementStatus::Active;
    h.db.upsert_requirement(&req).unwrap();

    let mut avail = availability(partner, commodity.id);
    avail.risk_state = RiskState::Pass;
    h.db.upsert_availability(&avail).unwrap();

    let outcome = h.matching.match_requirement(&req, &commodity).unwrap();
    assert!(outcome.tokens.is_empty(), "self-match must never emit a token");
}

/// S3: in an IN_PROGRESS negotiation, the side that just offered cannot
/// offer again before the other side responds.
#[test]
fn s3_alternation_violated() {
    let h = harness();
    let commodity = cotton_commodity();
    h.db.upsert_commodity(&commodity).unwrap();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let req = requirement(buyer, commodity.id);
    let avail = availability(seller, commodity.id);
    h.db.upsert_requirement(&req).unwrap();
    h.db.upsert_availability(&avail).unwrap();

    let token = h.tokens.issue(req.id, avail.id, sample_breakdown(), "s3-dedup".into()).unwrap();
    let negotiation = h.negotiation.start(token.id, req.id, avail.id, buyer, seller, 7100.0, 50.0, None).unwrap();

    let (negotiation, _) = h.negotiation.make_offer(negotiation.id, buyer, 7100.0, 50.0, None, None, None, None).unwrap();
    assert_eq!(negotiation.last_offer_by, Some(Side::Buyer));

    let err = h.negotiation.make_offer(negotiation.id, buyer, 7120.0, 50.0, None, None, None, None);
    let err = err.unwrap_err().downcast::<tradecore::error::AppError>().unwrap();
    match err {
        tradecore::error::AppError::Precondition(code, _) => assert_eq!(code, "ALTERNATION_VIOLATED"),
        other => panic!("expected Precondition(ALTERNATION_VIOLATED), got {other:?}"),
    }
}

/// S4: two reservation attempts race for the last of an availability's
/// quantity; exactly one wins, the other sees a conflict.
#[test]
fn s4_reservation_race_exactly_one_winner() {
    let h = harness();
    let commodity = cotton_commodity();
    h.db.upsert_commodity(&commodity).unwrap();
    let seller = Uuid::new_v4();
    let avail = availability(seller, commodity.id);
    h.db.upsert_availability(&avail).unwrap();

    let loaded = h.db.get_availability(avail.id).unwrap().unwrap();
    let first = loaded.try_reserve(50.0).unwrap();
    let first_committed = h.db.cas_update_availability(&first, loaded.version).unwrap();
    assert!(first_committed, "first reservation should win the compare-and-swap");

    // second racer loaded the same stale version and now tries to commit
    // against quantity that is no longer available.
    let second_attempt = loaded.try_reserve(50.0).unwrap();
    let second_committed = h.db.cas_update_availability(&second_attempt, loaded.version).unwrap();
    assert!(!second_committed, "second racer must lose the compare-and-swap on stale version");

    let current = h.db.get_availability(avail.id).unwrap().unwrap();
    assert_eq!(current.reserved_quantity, 50.0);
    assert_eq!(current.available_quantity, 0.0);
    assert!(!current.can_reserve(1.0));
}

/// S5: an inactive negotiation is swept to EXPIRED, after which further
/// offers are rejected as terminal.
#[test]
fn s5_expiry_sweep_then_terminal() {
    let h = harness();
    let commodity = cotton_commodity();
    h.db.upsert_commodity(&commodity).unwrap();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let req = requirement(buyer, commodity.id);
    let avail = availability(seller, commodity.id);
    h.db.upsert_requirement(&req).unwrap();
    h.db.upsert_availability(&avail).unwrap();

    let token = h.tokens.issue(req.id, avail.id, sample_breakdown(), "s5-dedup".into()).unwrap();
    let negotiation = h.negotiation.start(token.id, req.id, avail.id, buyer, seller, 7100.0, 50.0, None).unwrap();

    // backdate expiry so the sweep picks it up.
    let mut stale = h.db.get_negotiation(negotiation.id).unwrap().unwrap();
    stale.expires_at = Utc::now() - Duration::hours(1);
    stale.last_activity_at = Utc::now() - Duration::hours(49);
    h.db.upsert_negotiation(&stale).unwrap();

    let expired = h.negotiation.expire_inactive().unwrap();
    assert!(expired.contains(&negotiation.id));

    let err = h.negotiation.make_offer(negotiation.id, buyer, 7100.0, 50.0, None, None, None, None);
    let err = err.unwrap_err().downcast::<tradecore::error::AppError>().unwrap();
    match err {
        tradecore::error::AppError::Precondition(code, _) => assert_eq!(code, "NEGOTIATION_TERMINAL"),
        other => panic!("expected Precondition(NEGOTIATION_TERMINAL), got {other:?}"),
    }
}

/// S6: accepting a negotiation whose terms are missing mandatory fields
/// never produces a Trade row.
#[test]
fn s6_incomplete_trade_terms_block_creation() {
    let h = harness();
    let commodity = cotton_commodity();
    h.db.upsert_commodity(&commodity).unwrap();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let req = requirement(buyer, commodity.id);
    let avail = availability(seller, commodity.id);
    h.db.upsert_requirement(&req).unwrap();
    h.db.upsert_availability(&avail).unwrap();

    let token = h.tokens.issue(req.id, avail.id, sample_breakdown(), "s6-dedup".into()).unwrap();
    let negotiation = h.negotiation.start(token.id, req.id, avail.id, buyer, seller, 7100.0, 50.0, None).unwrap();
    let (negotiation, _) = h.negotiation.make_offer(negotiation.id, buyer, 7100.0, 50.0, None, None, None, None).unwrap();
    let negotiation = h.negotiation.accept(negotiation.id, seller, None).unwrap();

    let mut incomplete = complete_draft(7100.0, 50.0);
    incomplete.quality.parameters.clear();
    incomplete.quality.testing_method = String::new();

    let missing = h.trade.validate_draft(&incomplete);
    assert!(!missing.is_empty());
    assert!(missing.iter().any(|f| f.contains("quality")));

    let result = h.trade.create_from_negotiation(&negotiation, incomplete, vec![], vec![], "GJ", 23.03, 72.58);
    assert!(result.is_err(), "trade must not be created from incomplete terms");

    let reloaded = h.db.get_negotiation(negotiation.id).unwrap().unwrap();
    assert!(reloaded.trade_id.is_none(), "a rejected draft must never attach a trade to the negotiation");
}

fn sample_breakdown() -> tradecore::matching::ScoreBreakdown {
    tradecore::matching::ScoreBreakdown {
        quality: 1.0,
        price: 1.0,
        quantity: 1.0,
        location: 1.0,
        timeline: 1.0,
        risk: 1.0,
        warn_penalty_applied: false,
        ai_boost_applied: false,
        total: 0.9,
    }
}
