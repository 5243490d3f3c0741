//! Weighted multi-factor similarity scoring between one requirement and one
//! availability candidate, plus the tie-break and modifier rules layered on
//! top of the raw weighted sum.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Availability, Commodity, DeliveryLocation, RiskState, Requirement};

use super::geo::haversine_km;

const WEIGHT_QUALITY: f64 = 0.30;
const WEIGHT_PRICE: f64 = 0.25;
const WEIGHT_QUANTITY: f64 = 0.15;
const WEIGHT_LOCATION: f64 = 0.10;
const WEIGHT_TIMELINE: f64 = 0.10;
const WEIGHT_RISK: f64 = 0.10;

const WARN_PENALTY: f64 = 0.10;
const AI_BOOST: f64 = 0.05;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub quality: f64,
    pub price: f64,
    pub quantity: f64,
    pub location: f64,
    pub timeline: f64,
    pub risk: f64,
    pub warn_penalty_applied: bool,
    pub ai_boost_applied: bool,
    pub total: f64,
}

fn quality_score(req: &Requirement, avail: &Availability, commodity: &Commodity) -> f64 {
    let mandatory: Vec<&str> = commodity.mandatory_params().map(|s| s.as_str()).collect();
    if mandatory.iter().any(|p| !avail.quality_spec.contains_key(*p)) {
        return 0.0;
    }
    if req.quality_spec.is_empty() {
        return 1.0;
    }
    let mut total = 0.0;
    let mut count = 0;
    for (param, req_value) in &req.quality_spec {
        let Some(avail_value) = avail.quality_spec.get(param) else {
            if mandatory.contains(&param.as_str()) {
                return 0.0;
            }
            continue;
        };
        let schema_tolerance = commodity
            .quality_schema
            .get(param)
            .and_then(|spec| spec.tolerance);
        total += req_value.closeness(avail_value, schema_tolerance);
        count += 1;
    }
    if count == 0 {
        1.0
    } else {
        total / count as f64
    }
}

fn price_score(req: &Requirement, avail: &Availability) -> f64 {
    if avail.asking_price <= req.preferred_price {
        1.0
    } else if avail.asking_price >= req.max_price {
        0.0
    } else {
        let span = req.max_price - req.preferred_price;
        if span <= 0.0 {
            0.0
        } else {
            1.0 - (avail.asking_price - req.preferred_price) / span
        }
    }
}

fn quantity_score(req: &Requirement, avail: &Availability) -> f64 {
    let satisfiable = avail.available_quantity.min(req.quantity);
    let mut ratio = satisfiable / req.quantity;
    if !avail.allow_partial_order && avail.available_quantity + 1e-9 < req.quantity {
        ratio = 0.0;
    }
    if req.quantity < avail.min_order_quantity - 1e-9 {
        ratio = 0.0;
    }
    ratio.clamp(0.0, 1.0)
}

fn location_score(req: &Requirement, avail: &Availability, max_radius_km: f64) -> f64 {
    match (&req.delivery_location, &avail.delivery_location) {
        (DeliveryLocation::Registered { location_id: a }, DeliveryLocation::Registered { location_id: b }) => {
            if a == b {
                1.0
            } else {
                0.5
            }
        }
        (
            DeliveryLocation::AdHoc { lat: lat1, lng: lng1, .. },
            DeliveryLocation::AdHoc { lat: lat2, lng: lng2, .. },
        ) => {
            let distance = haversine_km(*lat1, *lng1, *lat2, *lng2);
            (1.0 - distance / max_radius_km).clamp(0.0, 1.0)
        }
        _ => 0.3,
    }
}

fn timeline_score(req: &Requirement, avail: &Availability) -> f64 {
    let start = req.delivery_window_start.max(avail.delivery_window_start);
    let end = req.delivery_window_end.min(avail.delivery_window_end);
    if end <= start {
        return 0.0;
    }
    let overlap = (end - start).num_seconds().max(0) as f64;
    let req_span = (req.delivery_window_end - req.delivery_window_start)
        .num_seconds()
        .max(1) as f64;
    (overlap / req_span).clamp(0.0, 1.0)
}

fn risk_component(risk_score_0_100: f64) -> f64 {
    (risk_score_0_100 / 100.0).clamp(0.0, 1.0)
}

/// Computes the weighted similarity for one (requirement, availability)
/// pair. `risk_score_0_100` is the bilateral risk evaluator's final score.
pub fn score_pair(
    req: &Requirement,
    avail: &Availability,
    commodity: &Commodity,
    risk_score_0_100: f64,
    max_radius_km: f64,
    ai_recommended: bool,
) -> ScoreBreakdown {
    let quality = quality_score(req, avail, commodity);
    let price = price_score(req, avail);
    let quantity = quantity_score(req, avail);
    let location = location_score(req, avail, max_radius_km);
    let timeline = timeline_score(req, avail);
    let risk = risk_component(risk_score_0_100);

    let mut total = WEIGHT_QUALITY * quality
        + WEIGHT_PRICE * price
        + WEIGHT_QUANTITY * quantity
        + WEIGHT_LOCATION * location
        + WEIGHT_TIMELINE * timeline
        + WEIGHT_RISK * risk;

    let warn_penalty_applied = req.risk_state == RiskState::Warn || avail.risk_state == RiskState::Warn;
    if warn_penalty_applied {
        total *= 1.0 - WARN_PENALTY;
    }

    let ai_boost_applied = ai_recommended;
    if ai_boost_applied {
        total = (total + AI_BOOST).min(1.0);
    }

    ScoreBreakdown {
        quality,
        price,
        quantity,
        location,
        timeline,
        risk,
        warn_penalty_applied,
        ai_boost_applied,
        total,
    }
}

/// Tie-break key: score desc, then latest activity desc, then a stable
/// pseudo-random order over the pair id so no single pair starves forever.
pub fn tie_break_key(
    breakdown: &ScoreBreakdown,
    last_activity_unix: i64,
    requirement_id: Uuid,
    availability_id: Uuid,
) -> (i64, i64, u64) {
    let score_key = (breakdown.total * 1_000_000.0).round() as i64;
    let pair_hash = stable_pair_hash(requirement_id, availability_id);
    (score_key, last_activity_unix, pair_hash)
}

fn stable_pair_hash(a: Uuid, b: Uuid) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    a.hash(&mut hasher);
    b.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::requirement::{DeliveryLocation as DL, IntentType, MarketVisibility};
    use crate::domain::{AvailabilityIntent, AvailabilityStatus, ApprovalStatus};
    use chrono::Utc;

    fn commodity() -> Commodity {
        Commodity {
            id: Uuid::new_v4(),
            name: "Wheat".into(),
            variety: None,
            default_trade_unit: "quintal".into(),
            default_rate_unit: "quintal".into(),
            default_base_unit: "kg".into(),
            quality_schema: Default::default(),
        }
    }

    fn req() -> Requirement {
        Requirement {
            id: Uuid::new_v4(),
            buyer_partner_id: Uuid::new_v4(),
            buyer_branch_location_id: None,
            commodity_id: Uuid::new_v4(),
            quantity: 50.0,
            unit: "quintal".into(),
            preferred_price: 2000.0,
            max_price: 2200.0,
            quality_spec: Default::default(),
            delivery_location: DL::AdHoc { address: "A".into(), lat: 23.0, lng: 72.5, region: "GJ".into(), pincode: "380001".into() },
            delivery_window_start: Utc::now(),
            delivery_window_end: Utc::now() + chrono::Duration::days(5),
            intent_type: IntentType::Negotiation,
            market_visibility: MarketVisibility::Public,
            invited_seller_ids: vec![],
            urgency: 1,
            eod_cutoff: Utc::now() + chrono::Duration::days(5),
            status: crate::domain::RequirementStatus::Active,
            version: 0,
            risk_state: RiskState::Pass,
            embedding: None,
        }
    }

    fn avail() -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            seller_branch_location_id: None,
            commodity_id: Uuid::new_v4(),
            total_quantity: 100.0,
            available_quantity: 100.0,
            reserved_quantity: 0.0,
            sold_quantity: 0.0,
            unit: "quintal".into(),
            asking_price: 1900.0,
            allow_partial_order: true,
            min_order_quantity: 1.0,
            quality_spec: Default::default(),
            delivery_location: DL::AdHoc { address: "B".into(), lat: 23.03, lng: 72.58, region: "GJ".into(), pincode: "380002".into() },
            delivery_window_start: Utc::now(),
            delivery_window_end: Utc::now() + chrono::Duration::days(5),
            intent_type: AvailabilityIntent::Spot,
            market_visibility: MarketVisibility::Public,
            invited_buyer_ids: vec![],
            approval_status: ApprovalStatus::Approved,
            eod_cutoff: Utc::now() + chrono::Duration::days(5),
            status: AvailabilityStatus::Active,
            version: 0,
            risk_state: RiskState::Pass,
            embedding: None,
        }
    }

    #[test]
    fn good_match_scores_high() {
        let breakdown = score_pair(&req(), &avail(), &commodity(), 90.0, 500.0, false);
        assert!(breakdown.total > 0.7, "total was {}", breakdown.total);
    }

    #[test]
    fn price_above_max_scores_zero_price_component() {
        let mut a = avail();
        a.asking_price = 5000.0;
        let breakdown = score_pair(&req(), &a, &commodity(), 90.0, 500.0, false);
        assert_eq!(breakdown.price, 0.0);
    }

    #[test]
    fn warn_state_applies_penalty() {
        let mut r = req();
        r.risk_state = RiskState::Warn;
        let breakdown = score_pair(&r, &avail(), &commodity(), 90.0, 500.0, false);
        assert!(breakdown.warn_penalty_applied);
    }
}
