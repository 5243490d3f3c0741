//! Optional, never-blocking negotiation assistance: counter-offer
//! suggestions and auto-accept evaluation. Neither function touches
//! storage; callers decide whether and when to apply the result.

use serde::Serialize;

use super::model::{NegotiationOffer, Side};

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedCounter {
    pub price: f64,
    pub quantity: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub acceptance_probability: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoAcceptTolerance {
    pub price_pct: f64,
    pub quantity_pct: f64,
}

impl Default for AutoAcceptTolerance {
    fn default() -> Self {
        Self { price_pct: 0.05, quantity_pct: 0.90 }
    }
}

/// Splits the gap between the current offer and the side's own reference
/// price/quantity, weighted toward meeting in the middle with a mild nudge
/// toward the offering side as rounds accumulate.
pub fn suggest_counter(
    current_offer: &NegotiationOffer,
    side: Side,
    reference_price: f64,
    reference_quantity: f64,
    rounds_elapsed: u32,
) -> SuggestedCounter {
    let convergence = (0.5 + 0.05 * rounds_elapsed.min(6) as f64).min(0.8);
    let price = current_offer.price_per_unit + (reference_price - current_offer.price_per_unit) * (1.0 - convergence);
    let quantity = current_offer.quantity + (reference_quantity - current_offer.quantity) * (1.0 - convergence);

    let price_distance = 1.0 - ((price - reference_price).abs() / reference_price.max(1.0)).min(1.0);
    let quantity_match = 1.0 - ((quantity - reference_quantity).abs() / reference_quantity.max(1.0)).min(1.0);
    let time_pressure = (rounds_elapsed as f64 / 10.0).min(1.0);

    let acceptance_probability = 0.5 * price_distance + 0.3 * quantity_match + 0.2 * time_pressure;

    SuggestedCounter {
        price: (price * 100.0).round() / 100.0,
        quantity: (quantity * 100.0).round() / 100.0,
        confidence: price_distance.max(quantity_match),
        reasoning: format!(
            "counter narrows the gap by {:.0}% given {} prior round(s)",
            (1.0 - convergence) * 100.0,
            rounds_elapsed
        ),
        acceptance_probability,
    }
}

/// True only when the side opted into auto-negotiation and the incoming
/// offer already falls within its configured tolerance band.
pub fn should_auto_accept(
    offer: &NegotiationOffer,
    reference_price: f64,
    reference_quantity: f64,
    auto_negotiate_enabled: bool,
    tolerance: AutoAcceptTolerance,
) -> bool {
    if !auto_negotiate_enabled {
        return false;
    }
    let price_within = (offer.price_per_unit - reference_price).abs() <= reference_price * tolerance.price_pct;
    let quantity_within = offer.quantity >= reference_quantity * tolerance.quantity_pct;
    price_within && quantity_within
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn offer(price: f64, quantity: f64) -> NegotiationOffer {
        NegotiationOffer {
            id: Uuid::new_v4(),
            negotiation_id: Uuid::new_v4(),
            round_number: 1,
            offered_by: Side::Seller,
            price_per_unit: price,
            quantity,
            delivery_terms: None,
            payment_terms: None,
            quality_conditions: None,
            message: None,
            ai_generated: false,
            ai_confidence: None,
            ai_reasoning: None,
            status: super::super::model::OfferStatus::Pending,
            responded_at: None,
            response_message: None,
        }
    }

    #[test]
    fn counter_moves_toward_reference() {
        let suggestion = suggest_counter(&offer(2200.0, 40.0), Side::Buyer, 2000.0, 50.0, 1);
        assert!(suggestion.price < 2200.0 && suggestion.price > 2000.0);
    }

    #[test]
    fn auto_accept_requires_opt_in() {
        let within_tolerance = offer(2040.0, 49.0);
        assert!(!should_auto_accept(&within_tolerance, 2000.0, 50.0, false, Default::default()));
        assert!(should_auto_accept(&within_tolerance, 2000.0, 50.0, true, Default::default()));
    }

    #[test]
    fn auto_accept_rejects_outside_tolerance() {
        let outside = offer(2500.0, 49.0);
        assert!(!should_auto_accept(&outside, 2000.0, 50.0, true, Default::default()));
    }
}
