//! Matching Engine (C3): turns a freshly risk-passed requirement or
//! availability into scored, bilaterally-validated match tokens.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use rayon::prelude::*;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Db;
use crate::domain::requirement::{DeliveryLocation, IntentType};
use crate::domain::{Availability, AvailabilityIntent, Commodity, Requirement};
use crate::events::{Event, EventLog};
use crate::risk::{BilateralContext, RiskContext, RiskEvaluator};

use super::geo::haversine_km;
use super::queue::{MatchJob, MatchQueue, Priority};
use super::scoring::{score_pair, tie_break_key};
use super::token::{MatchToken, MatchTokenStore};

const DEDUP_WINDOW_SECS: i64 = 15 * 60;
const TOP_K_CANDIDATES: usize = 50;
const MAX_RESERVATION_ATTEMPTS: u32 = 5;
const RESERVATION_BACKOFF_BASE_MS: u64 = 25;

pub struct MatchingEngine {
    db: Db,
    events: Arc<EventLog>,
    risk: Arc<RiskEvaluator>,
    tokens: Arc<MatchTokenStore>,
    queue: Arc<MatchQueue>,
    max_radius_km: f64,
    circular_lookback_days: i64,
}

pub struct MatchOutcome {
    pub tokens: Vec<MatchToken>,
    pub rejected: Vec<(Uuid, Uuid, String)>, // (requirement_id, availability_id, reason)
}

impl MatchingEngine {
    pub fn new(
        db: Db,
        events: Arc<EventLog>,
        risk: Arc<RiskEvaluator>,
        tokens: Arc<MatchTokenStore>,
        queue: Arc<MatchQueue>,
        max_radius_km: f64,
        circular_lookback_days: i64,
    ) -> Self {
        Self { db, events, risk, tokens, queue, max_radius_km, circular_lookback_days }
    }

    /// Re-runs matching for a job popped off the MEDIUM/LOW retry queue: a
    /// requirement or availability whose synchronous reservation attempt
    /// exhausted its CAS retries the first time around.
    pub fn retry_job(&self, job: &MatchJob) -> Result<MatchOutcome> {
        match job.aggregate_type {
            "requirement" => {
                let requirement = self
                    .db
                    .get_requirement(job.aggregate_id)?
                    .ok_or_else(|| anyhow::anyhow!("requirement {} no longer exists", job.aggregate_id))?;
                let commodity = self
                    .db
                    .get_commodity(requirement.commodity_id)?
                    .ok_or_else(|| anyhow::anyhow!("commodity {} no longer exists", requirement.commodity_id))?;
                self.match_requirement(&requirement, &commodity)
            }
            "availability" => {
                let availability = self
                    .db
                    .get_availability(job.aggregate_id)?
                    .ok_or_else(|| anyhow::anyhow!("availability {} no longer exists", job.aggregate_id))?;
                let commodity = self
                    .db
                    .get_commodity(availability.commodity_id)?
                    .ok_or_else(|| anyhow::anyhow!("commodity {} no longer exists", availability.commodity_id))?;
                self.match_availability(&availability, &commodity)
            }
            other => anyhow::bail!("unknown match queue aggregate type: {other}"),
        }
    }

    /// Entry point for a freshly persisted, PASS/WARN requirement: finds
    /// compatible availabilities, scores them, reserves quantity for the
    /// best survivors, and emits match tokens.
    pub fn match_requirement(&self, requirement: &Requirement, commodity: &Commodity) -> Result<MatchOutcome> {
        let candidates = self.db.active_availabilities_for_commodity(requirement.commodity_id)?;
        let prefiltered = self.prefilter_for_requirement(requirement, candidates);
        self.score_and_reserve(requirement, prefiltered, commodity)
    }

    pub fn match_availability(&self, availability: &Availability, commodity: &Commodity) -> Result<MatchOutcome> {
        let candidates = self.db.active_requirements_for_commodity(availability.commodity_id)?;
        let mut outcome = MatchOutcome { tokens: vec![], rejected: vec![] };
        for requirement in candidates {
            if !self.is_pair_eligible(&requirement, availability) {
                continue;
            }
            let partial = self.score_and_reserve(&requirement, vec![availability.clone()], commodity)?;
            outcome.tokens.extend(partial.tokens);
            outcome.rejected.extend(partial.rejected);
        }
        Ok(outcome)
    }

    fn prefilter_for_requirement(&self, requirement: &Requirement, candidates: Vec<Availability>) -> Vec<Availability> {
        let mut eligible: Vec<Availability> = candidates
            .into_iter()
            .filter(|a| self.is_pair_eligible(requirement, a))
            .collect();

        // Cheap pre-sort by price tier before detailed scoring, then cap to
        // the top-K candidate set.
        eligible.sort_by(|a, b| {
            let da = (a.asking_price - requirement.preferred_price).abs();
            let db_ = (b.asking_price - requirement.preferred_price).abs();
            da.partial_cmp(&db_).unwrap_or(std::cmp::Ordering::Equal)
        });
        eligible.truncate(TOP_K_CANDIDATES);
        eligible
    }

    fn is_pair_eligible(&self, requirement: &Requirement, availability: &Availability) -> bool {
        if requirement.buyer_partner_id == availability.seller_partner_id {
            return false; // self-matching blocked
        }
        if requirement.commodity_id != availability.commodity_id {
            return false;
        }
        if !matches!(
            requirement.status,
            crate::domain::RequirementStatus::Active
        ) {
            return false;
        }
        if !matches!(availability.status, crate::domain::AvailabilityStatus::Active) {
            return false;
        }
        if !requirement.is_visible_to(availability.seller_partner_id) {
            return false;
        }
        if !availability.is_visible_to(requirement.buyer_partner_id) {
            return false;
        }
        if !intents_compatible(requirement.intent_type, availability.intent_type) {
            return false;
        }
        if let (
            DeliveryLocation::AdHoc { lat: r_lat, lng: r_lng, .. },
            DeliveryLocation::AdHoc { lat: a_lat, lng: a_lng, .. },
        ) = (&requirement.delivery_location, &availability.delivery_location)
        {
            if haversine_km(*r_lat, *r_lng, *a_lat, *a_lng) > self.max_radius_km {
                return false;
            }
        }
        true
    }

    fn score_and_reserve(
        &self,
        requirement: &Requirement,
        candidates: Vec<Availability>,
        commodity: &Commodity,
    ) -> Result<MatchOutcome> {
        let recent_keys = self.tokens.recently_emitted_dedup_keys(DEDUP_WINDOW_SECS)?;
        let position_edges = self.db.open_position_edges(self.circular_lookback_days)?;

        // Scoring is CPU-bound and must not hold a database transaction;
        // rayon fans it out across the candidate set and nothing here
        // touches storage.
        let scored: Vec<(Availability, super::scoring::ScoreBreakdown, String)> = candidates
            .into_par_iter()
            .map(|availability| {
                let risk_outcome = self.risk.evaluate(&RiskContext::Bilateral(bilateral_context(
                    requirement,
                    &availability,
                    &position_edges,
                )));
                let breakdown = score_pair(
                    requirement,
                    &availability,
                    commodity,
                    risk_outcome.score,
                    self.max_radius_km,
                    false,
                );
                let dedup_key = dedup_key(requirement.id, availability.id, &breakdown);
                (availability, breakdown, dedup_key)
            })
            .collect();

        let mut ranked: Vec<_> = scored
            .into_iter()
            .filter(|(_, breakdown, dedup_key)| breakdown.total > 0.0 && !recent_keys.contains(dedup_key))
            .collect();

        ranked.sort_by(|(a_avail, a_breakdown, _), (b_avail, b_breakdown, _)| {
            let a_key = tie_break_key(a_breakdown, Utc::now().timestamp(), requirement.id, a_avail.id);
            let b_key = tie_break_key(b_breakdown, Utc::now().timestamp(), requirement.id, b_avail.id);
            b_key.cmp(&a_key)
        });

        let mut outcome = MatchOutcome { tokens: vec![], rejected: vec![] };

        for (availability, breakdown, dedup_key) in ranked {
            match self.reserve_with_retry(&availability, requirement.quantity.min(availability.available_quantity)) {
                Ok(Some(_reserved)) => {
                    let requirement_id = requirement.id;
                    let availability_id = availability.id;
                    let token = self.tokens.issue_with_event(
                        requirement_id,
                        availability_id,
                        breakdown,
                        dedup_key,
                        |token| {
                            info!(requirement_id = %requirement_id, availability_id = %availability_id, score = token.score, "match found");
                            Event::new(
                                "match.found",
                                1,
                                "match_token",
                                token.id,
                                None,
                                Uuid::new_v4(),
                                json!({
                                    "requirementId": requirement_id,
                                    "availabilityId": availability_id,
                                    "score": token.score,
                                }),
                            )
                        },
                    )?;
                    metrics::counter!("tradecore_matches_found_total").increment(1);
                    outcome.tokens.push(token);
                }
                Ok(None) => {
                    outcome.rejected.push((
                        requirement.id,
                        availability.id,
                        "reservation exhausted retries".to_string(),
                    ));
                    self.emit_allocation_failed(requirement.id, availability.id)?;
                    metrics::counter!("tradecore_match_allocation_failed_total").increment(1);
                    self.queue.try_enqueue(MatchJob {
                        aggregate_type: "requirement",
                        aggregate_id: requirement.id,
                        priority: Priority::Medium,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "reservation attempt errored");
                    outcome.rejected.push((requirement.id, availability.id, e.to_string()));
                }
            }
        }

        Ok(outcome)
    }

    /// Bounded compare-and-swap retry loop, per the spec's optimistic-lock
    /// reservation contract: refetch, re-validate, retry with exponential
    /// backoff starting at 25ms, up to 5 attempts.
    fn reserve_with_retry(&self, availability: &Availability, quantity: f64) -> Result<Option<Availability>> {
        let mut current = self.db.get_availability(availability.id)?.unwrap_or_else(|| availability.clone());
        for attempt in 0..MAX_RESERVATION_ATTEMPTS {
            if !current.can_reserve(quantity) {
                return Ok(None);
            }
            let expected_version = current.version;
            let next = current.try_reserve(quantity)?;
            if self.db.cas_update_availability(&next, expected_version)? {
                return Ok(Some(next));
            }
            let backoff = RESERVATION_BACKOFF_BASE_MS * 2u64.pow(attempt);
            let jitter = rand::thread_rng().gen_range(0..10);
            std::thread::sleep(StdDuration::from_millis(backoff + jitter));
            current = match self.db.get_availability(availability.id)? {
                Some(a) => a,
                None => return Ok(None),
            };
        }
        Ok(None)
    }

    fn emit_allocation_failed(&self, requirement_id: Uuid, availability_id: Uuid) -> Result<()> {
        let event = Event::new(
            "match.allocation_failed",
            1,
            "availability",
            availability_id,
            None,
            Uuid::new_v4(),
            json!({ "requirementId": requirement_id }),
        );
        self.events.append(&event)
    }
}

/// `IntentType::Negotiation` is the general-purpose buyer posture and can
/// settle against any seller-side offering shape. The other buyer intents
/// expect an immediately transactable counterparty (spot or OTC supply), not
/// one committed to a separately-negotiated booking or forward contract.
fn intents_compatible(req: IntentType, avail: AvailabilityIntent) -> bool {
    match req {
        IntentType::Negotiation => true,
        IntentType::DirectBuy | IntentType::Auction | IntentType::PriceDiscovery => {
            matches!(avail, AvailabilityIntent::Spot | AvailabilityIntent::Otc)
        }
    }
}

/// Buyer-to-seller edges are partner ids regardless of role; a new
/// `from -> to` pairing closes a cycle if `to` can already reach `from`
/// through existing open positions within the lookback window.
fn would_form_cycle(edges: &[(Uuid, Uuid)], from: Uuid, to: Uuid) -> bool {
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![to];
    while let Some(node) = stack.pop() {
        if node == from {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        for (buyer, seller) in edges {
            if *buyer == node {
                stack.push(*seller);
            }
        }
    }
    false
}

fn bilateral_context(
    requirement: &Requirement,
    availability: &Availability,
    position_edges: &[(Uuid, Uuid)],
) -> BilateralContext {
    use crate::capability::Capability;
    use crate::risk::{CreditProfile, EntityContext};

    // Partner onboarding/KYC is out of scope, so `pan_or_equivalent` has no
    // real source today and both sides carry `None`; the comparison below
    // is written against real data rather than a literal `false` so it
    // starts reporting true UBO collisions the moment KYC data is wired in.
    let buyer_pan: Option<String> = None;
    let seller_pan: Option<String> = None;
    let same_ultimate_beneficial_owner = match (&buyer_pan, &seller_pan) {
        (Some(b), Some(s)) => b == s,
        _ => false,
    };

    BilateralContext {
        buyer: EntityContext {
            partner_id: requirement.buyer_partner_id,
            pan_or_equivalent: buyer_pan,
            capabilities: vec![Capability::Buy],
            required_capability: Capability::Buy,
            credit: CreditProfile::default(),
            sanctions_hit: false,
            export_license_required: false,
            export_license_present: false,
        },
        seller: EntityContext {
            partner_id: availability.seller_partner_id,
            pan_or_equivalent: seller_pan,
            capabilities: vec![Capability::Sell],
            required_capability: Capability::Sell,
            credit: CreditProfile::default(),
            sanctions_hit: false,
            export_license_required: false,
            export_license_present: false,
        },
        same_ultimate_beneficial_owner,
        would_form_circular_position: would_form_cycle(
            position_edges,
            requirement.buyer_partner_id,
            availability.seller_partner_id,
        ),
        estimated_value: availability.asking_price * requirement.quantity,
    }
}

fn dedup_key(requirement_id: Uuid, availability_id: Uuid, breakdown: &super::scoring::ScoreBreakdown) -> String {
    let rounded_price_tier = (breakdown.price * 20.0).round() as i64;
    let rounded_qty_tier = (breakdown.quantity * 20.0).round() as i64;
    let quality_digest = (breakdown.quality * 100.0).round() as i64;
    let mut hasher = Sha256::new();
    hasher.update(requirement_id.as_bytes());
    hasher.update(availability_id.as_bytes());
    hasher.update(rounded_price_tier.to_le_bytes());
    hasher.update(rounded_qty_tier.to_le_bytes());
    hasher.update(quality_digest.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_requirement_accepts_any_availability_intent() {
        assert!(intents_compatible(IntentType::Negotiation, AvailabilityIntent::Booking));
        assert!(intents_compatible(IntentType::Negotiation, AvailabilityIntent::Contract));
    }

    #[test]
    fn direct_buy_rejects_booking_and_contract() {
        assert!(!intents_compatible(IntentType::DirectBuy, AvailabilityIntent::Booking));
        assert!(!intents_compatible(IntentType::DirectBuy, AvailabilityIntent::Contract));
        assert!(intents_compatible(IntentType::DirectBuy, AvailabilityIntent::Spot));
        assert!(intents_compatible(IntentType::DirectBuy, AvailabilityIntent::Otc));
    }

    #[test]
    fn cycle_detected_through_intermediate_partner() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // a bought from b, b bought from c; a new c -> a pairing closes the loop.
        let edges = vec![(a, b), (b, c)];
        assert!(would_form_cycle(&edges, c, a));
    }

    #[test]
    fn no_cycle_without_a_path_back() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let edges = vec![(a, b)];
        assert!(!would_form_cycle(&edges, c, a));
    }
}
