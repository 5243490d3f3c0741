use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::Capability;

/// Inputs the rule engine scores directly, independent of the ML opinion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditProfile {
    pub credit_utilization_pct: f64,
    pub exposure_ratio: f64,
    pub counterparty_rating: f64,
    pub counterparty_vintage_years: f64,
    pub payment_history_score: f64,
    pub delivery_history_score: f64,
    pub dispute_count: u32,
}

impl Default for CreditProfile {
    fn default() -> Self {
        Self {
            credit_utilization_pct: 0.0,
            exposure_ratio: 0.0,
            counterparty_rating: 80.0,
            counterparty_vintage_years: 3.0,
            payment_history_score: 80.0,
            delivery_history_score: 80.0,
            dispute_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityContext {
    pub partner_id: Uuid,
    pub pan_or_equivalent: Option<String>,
    pub capabilities: Vec<Capability>,
    pub required_capability: Capability,
    pub credit: CreditProfile,
    pub sanctions_hit: bool,
    pub export_license_required: bool,
    pub export_license_present: bool,
}

impl EntityContext {
    pub fn has_required_capability(&self) -> bool {
        self.capabilities.contains(&self.required_capability)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilateralContext {
    pub buyer: EntityContext,
    pub seller: EntityContext,
    pub same_ultimate_beneficial_owner: bool,
    pub would_form_circular_position: bool,
    pub estimated_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContext {
    pub buyer: EntityContext,
    pub seller: EntityContext,
    pub trade_value: f64,
}

/// The three context shapes the evaluator's public contract accepts.
/// Transaction is carried for interface uniformity; payment/contract/shipment
/// scoring itself lives in downstream modules not covered here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RiskContext {
    Entity(EntityContext),
    Bilateral(BilateralContext),
    Transaction(TransactionContext),
}

impl RiskContext {
    pub fn entities(&self) -> Vec<&EntityContext> {
        match self {
            RiskContext::Entity(e) => vec![e],
            RiskContext::Bilateral(b) => vec![&b.buyer, &b.seller],
            RiskContext::Transaction(t) => vec![&t.buyer, &t.seller],
        }
    }
}
