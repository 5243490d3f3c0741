//! Pre-flight completeness validation (C6). The engine refuses to create a
//! trade unless every clause is populated and internally consistent; this
//! module is the single source of truth for what "complete" means.

use chrono::Utc;
use serde::Deserialize;

use super::model::Trade;

/// Everything required to construct a `Trade`, validated before any state
/// change happens. Mirrors `Trade`'s fields minus identifiers and
/// post-creation bookkeeping (signatures, hash, status).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftTerms {
    pub price_per_unit: f64,
    pub total_quantity: f64,
    pub unit: String,
    pub total_amount: f64,
    pub currency: String,
    pub delivery_date: chrono::DateTime<Utc>,
    pub incoterm: String,
    pub transport_mode: String,
    pub freight_responsibility: String,
    pub payment: super::model::PaymentTerms,
    pub quality: super::model::QualityTerms,
    pub inspection: super::model::InspectionTerms,
    pub legal: super::model::LegalTerms,
    pub penalties: super::model::PenaltyTerms,
}

/// Returns the list of missing/invalid fields; empty means complete.
pub fn validate(draft: &DraftTerms) -> Vec<String> {
    let mut missing = Vec::new();

    if draft.price_per_unit <= 0.0 {
        missing.push("pricePerUnit".into());
    }
    if draft.total_quantity <= 0.0 {
        missing.push("totalQuantity".into());
    }
    if draft.unit.trim().is_empty() {
        missing.push("unit".into());
    }
    if draft.currency.trim().is_empty() {
        missing.push("currency".into());
    }
    if (draft.total_amount - draft.price_per_unit * draft.total_quantity).abs() > 0.01 {
        missing.push("totalAmount (does not match price * quantity)".into());
    }

    if draft.delivery_date <= Utc::now() {
        missing.push("deliveryDate (must be in the future)".into());
    }
    if draft.incoterm.trim().is_empty() {
        missing.push("incoterm".into());
    }
    if draft.transport_mode.trim().is_empty() {
        missing.push("transportMode".into());
    }
    if draft.freight_responsibility.trim().is_empty() {
        missing.push("freightResponsibility".into());
    }

    if draft.payment.method.trim().is_empty() {
        missing.push("payment.method".into());
    }
    if !(0.0..=100.0).contains(&draft.payment.advance_pct) {
        missing.push("payment.advancePct".into());
    }
    if draft.payment.balance_due_days == 0 && draft.payment.advance_pct < 100.0 {
        missing.push("payment.balanceDueDays".into());
    }
    if draft.payment.late_penalty_pct_per_month < 0.0 {
        missing.push("payment.latePenaltyPctPerMonth".into());
    }

    if draft.quality.testing_method.trim().is_empty() {
        missing.push("quality.testingMethod".into());
    }
    if draft.quality.parameters.is_empty() {
        missing.push("quality.parameters".into());
    }

    if draft.inspection.agency.trim().is_empty() {
        missing.push("inspection.agency".into());
    }
    if draft.inspection.location.trim().is_empty() {
        missing.push("inspection.location".into());
    }
    if draft.inspection.rejection_terms.trim().is_empty() {
        missing.push("inspection.rejectionTerms".into());
    }

    if draft.legal.governing_law.trim().is_empty() {
        missing.push("legal.governingLaw".into());
    }
    if draft.legal.jurisdiction.trim().is_empty() {
        missing.push("legal.jurisdiction".into());
    }
    if draft.legal.dispute_resolution_method.trim().is_empty() {
        missing.push("legal.disputeResolutionMethod".into());
    }
    if draft.legal.force_majeure_clause.trim().is_empty() {
        missing.push("legal.forceMajeureClause".into());
    }

    if draft.penalties.quality_rejection_terms.trim().is_empty() {
        missing.push("penalties.qualityRejectionTerms".into());
    }
    if draft.penalties.buyer_cancellation_terms.trim().is_empty() {
        missing.push("penalties.buyerCancellationTerms".into());
    }
    if draft.penalties.seller_cancellation_terms.trim().is_empty() {
        missing.push("penalties.sellerCancellationTerms".into());
    }

    missing
}

/// Re-checks an already-constructed trade's term fields, used by
/// `POST /trades/validate/{negotiationId}` dry runs.
pub fn validate_trade(trade: &Trade) -> Vec<String> {
    validate(&DraftTerms {
        price_per_unit: trade.price_per_unit,
        total_quantity: trade.total_quantity,
        unit: trade.unit.clone(),
        total_amount: trade.total_amount,
        currency: trade.currency.clone(),
        delivery_date: trade.delivery_date,
        incoterm: trade.incoterm.clone(),
        transport_mode: trade.transport_mode.clone(),
        freight_responsibility: trade.freight_responsibility.clone(),
        payment: trade.payment.clone(),
        quality: trade.quality.clone(),
        inspection: trade.inspection.clone(),
        legal: trade.legal.clone(),
        penalties: trade.penalties.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::model::{BalanceTrigger, InspectionTerms, LegalTerms, PaymentTerms, PenaltyTerms, QualityTerms};

    fn complete_draft() -> DraftTerms {
        DraftTerms {
            price_per_unit: 2000.0,
            total_quantity: 50.0,
            unit: "quintal".into(),
            total_amount: 100_000.0,
            currency: "INR".into(),
            delivery_date: Utc::now() + chrono::Duration::days(10),
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
            quality: QualityTerms {
                parameters: [("moisture".to_string(), crate::domain::QualityValue::Exact { value: 12.0, tolerance: Some(1.0) })]
                    .into_iter()
                    .collect(),
                testing_method: "NABL lab".into(),
                tolerance: 1.0,
            },
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

    #[test]
    fn complete_draft_has_no_missing_fields() {
        assert!(validate(&complete_draft()).is_empty());
    }

    #[test]
    fn mismatched_total_amount_is_flagged() {
        let mut draft = complete_draft();
        draft.total_amount = 1.0;
        let missing = validate(&draft);
        assert!(missing.iter().any(|f| f.starts_with("totalAmount")));
    }

    #[test]
    fn past_delivery_date_is_flagged() {
        let mut draft = complete_draft();
        draft.delivery_date = Utc::now() - chrono::Duration::days(1);
        let missing = validate(&draft);
        assert!(missing.contains(&"deliveryDate (must be in the future)".to_string()));
    }
}
