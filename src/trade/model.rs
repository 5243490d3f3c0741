//! Trade aggregate: the immutable contract a negotiation freezes into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    PendingAddressSelection,
    Draft,
    PendingSignature,
    Active,
    InTransit,
    Delivered,
    QualityCheck,
    Completed,
    Cancelled,
    Disputed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Address {
    Registered { location_id: Uuid },
    AdHoc { address: String, city: String, state: String, pincode: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceTrigger {
    OnSigning,
    OnDelivery,
    OnQualityCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTerms {
    pub method: String,
    pub advance_pct: f64,
    pub advance_due_days: u32,
    pub balance_trigger: BalanceTrigger,
    pub balance_due_days: u32,
    pub late_penalty_pct_per_month: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityTerms {
    pub parameters: std::collections::HashMap<String, crate::domain::QualityValue>,
    pub testing_method: String,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionTerms {
    pub agency: String,
    pub location: String,
    pub timeline_days: u32,
    pub rejection_terms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalTerms {
    pub governing_law: String,
    pub jurisdiction: String,
    pub dispute_resolution_method: String,
    pub dispute_resolution_venue: String,
    pub force_majeure_clause: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyTerms {
    pub late_delivery_rate_pct: f64,
    pub late_delivery_cap_pct: f64,
    pub late_delivery_grace_days: u32,
    pub quality_rejection_terms: String,
    pub buyer_cancellation_terms: String,
    pub seller_cancellation_terms: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatorySide {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub side: SignatorySide,
    pub signed_by_partner_id: Uuid,
    pub signed_at: DateTime<Utc>,
    pub signature_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: Uuid,
    pub kind: String,
    pub recorded_at: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amendment {
    pub id: Uuid,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub buyer_partner_id: Uuid,
    pub seller_partner_id: Uuid,
    pub price_per_unit: f64,
    pub total_quantity: f64,
    pub unit: String,
    pub total_amount: f64,
    pub currency: String,
    pub ship_to: Option<Address>,
    pub ship_from: Option<Address>,
    pub buyer_eligible_branches: Vec<Address>,
    pub seller_eligible_branches: Vec<Address>,
    pub delivery_date: DateTime<Utc>,
    pub incoterm: String,
    pub transport_mode: String,
    pub freight_responsibility: String,
    pub payment: PaymentTerms,
    pub quality: QualityTerms,
    pub inspection: InspectionTerms,
    pub legal: LegalTerms,
    pub penalties: PenaltyTerms,
    pub signatures: Vec<Signature>,
    pub contract_hash: Option<String>,
    pub contract_pdf_ref: Option<String>,
    pub status: TradeStatus,
    pub milestones: Vec<Milestone>,
    pub amendments: Vec<Amendment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    pub fn is_signed_by(&self, side: SignatorySide) -> bool {
        self.signatures.iter().any(|s| s.side == side)
    }

    pub fn is_fully_signed(&self) -> bool {
        self.is_signed_by(SignatorySide::Buyer) && self.is_signed_by(SignatorySide::Seller)
    }
}
