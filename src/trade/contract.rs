//! Canonical term document rendering and content hashing. The canonical
//! form is deterministic JSON (keys sorted, no floating whitespace) so the
//! same terms always hash the same way regardless of field insertion order.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::model::Trade;

#[derive(Serialize)]
struct CanonicalTerms<'a> {
    negotiation_id: String,
    buyer_partner_id: String,
    seller_partner_id: String,
    price_per_unit: f64,
    total_quantity: f64,
    unit: &'a str,
    total_amount: f64,
    currency: &'a str,
    delivery_date: String,
    incoterm: &'a str,
    transport_mode: &'a str,
    freight_responsibility: &'a str,
    ship_to: &'a Option<super::model::Address>,
    ship_from: &'a Option<super::model::Address>,
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(String, Value)> = map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Renders the canonical byte form of a trade's frozen terms.
pub fn canonicalize(trade: &Trade) -> anyhow::Result<Vec<u8>> {
    let terms = CanonicalTerms {
        negotiation_id: trade.negotiation_id.to_string(),
        buyer_partner_id: trade.buyer_partner_id.to_string(),
        seller_partner_id: trade.seller_partner_id.to_string(),
        price_per_unit: trade.price_per_unit,
        total_quantity: trade.total_quantity,
        unit: &trade.unit,
        total_amount: trade.total_amount,
        currency: &trade.currency,
        delivery_date: trade.delivery_date.to_rfc3339(),
        incoterm: &trade.incoterm,
        transport_mode: &trade.transport_mode,
        freight_responsibility: &trade.freight_responsibility,
        ship_to: &trade.ship_to,
        ship_from: &trade.ship_from,
    };
    let value = serde_json::to_value(&terms)?;
    let canonical = sort_keys(value);
    Ok(serde_json::to_vec(&canonical)?)
}

pub fn contract_hash(trade: &Trade) -> anyhow::Result<String> {
    let bytes = canonicalize(trade)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::model::*;
    use uuid::Uuid;

    fn sample_trade() -> Trade {
        Trade {
            id: Uuid::new_v4(),
            negotiation_id: Uuid::new_v4(),
            buyer_partner_id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            price_per_unit: 2000.0,
            total_quantity: 50.0,
            unit: "quintal".into(),
            total_amount: 100_000.0,
            currency: "INR".into(),
            ship_to: None,
            ship_from: None,
            buyer_eligible_branches: vec![],
            seller_eligible_branches: vec![],
            delivery_date: chrono::Utc::now() + chrono::Duration::days(10),
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
            quality: QualityTerms { parameters: Default::default(), testing_method: "lab".into(), tolerance: 1.0 },
            inspection: InspectionTerms {
                agency: "SGS".into(),
                location: "warehouse".into(),
                timeline_days: 2,
                rejection_terms: "reject".into(),
            },
            legal: LegalTerms {
                governing_law: "India".into(),
                jurisdiction: "Ahmedabad".into(),
                dispute_resolution_method: "arbitration".into(),
                dispute_resolution_venue: "Ahmedabad".into(),
                force_majeure_clause: "standard".into(),
            },
            penalties: PenaltyTerms {
                late_delivery_rate_pct: 0.5,
                late_delivery_cap_pct: 5.0,
                late_delivery_grace_days: 2,
                quality_rejection_terms: "pro-rata".into(),
                buyer_cancellation_terms: "forfeits advance".into(),
                seller_cancellation_terms: "2x penalty".into(),
            },
            signatures: vec![],
            contract_hash: None,
            contract_pdf_ref: None,
            status: TradeStatus::Draft,
            milestones: vec![],
            amendments: vec![],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn hash_is_stable_across_calls() {
        let trade = sample_trade();
        assert_eq!(contract_hash(&trade).unwrap(), contract_hash(&trade).unwrap());
    }

    #[test]
    fn hash_changes_with_price() {
        let mut trade = sample_trade();
        let original = contract_hash(&trade).unwrap();
        trade.price_per_unit = 2100.0;
        assert_ne!(original, contract_hash(&trade).unwrap());
    }
}
