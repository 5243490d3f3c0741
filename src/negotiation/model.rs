//! Negotiation aggregate: alternating-offer protocol state plus chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buyer,
    Seller,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Buyer => Side::Seller,
            Side::Seller => Side::Buyer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NegotiationStatus {
    Initiated,
    InProgress,
    Accepted,
    Rejected,
    Expired,
}

impl NegotiationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationStatus::Accepted | NegotiationStatus::Rejected | NegotiationStatus::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationOffer {
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub round_number: u32,
    pub offered_by: Side,
    pub price_per_unit: f64,
    pub quantity: f64,
    pub delivery_terms: Option<String>,
    pub payment_terms: Option<String>,
    pub quality_conditions: Option<String>,
    pub message: Option<String>,
    pub ai_generated: bool,
    pub ai_confidence: Option<f64>,
    pub ai_reasoning: Option<String>,
    pub status: OfferStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub response_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageSender {
    Buyer,
    Seller,
    System,
    AiBot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationMessage {
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub sender: MessageSender,
    pub content: String,
    pub message_type: String,
    pub read_by_buyer_at: Option<DateTime<Utc>>,
    pub read_by_seller_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: Uuid,
    pub match_token_id: Uuid,
    pub requirement_id: Uuid,
    pub availability_id: Uuid,
    pub buyer_partner_id: Uuid,
    pub seller_partner_id: Uuid,
    pub status: NegotiationStatus,
    pub current_round: u32,
    pub current_price_per_unit: f64,
    pub current_quantity: f64,
    pub last_offer_by: Option<Side>,
    pub initiated_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_by: Option<Side>,
    pub rejected_by: Option<Side>,
    pub rejection_reason: Option<String>,
    pub trade_id: Option<Uuid>,
    pub ai_suggestions_enabled: bool,
    pub auto_negotiate_buyer: bool,
    pub auto_negotiate_seller: bool,
}

impl Negotiation {
    pub fn partner_for(&self, side: Side) -> Uuid {
        match side {
            Side::Buyer => self.buyer_partner_id,
            Side::Seller => self.seller_partner_id,
        }
    }

    pub fn side_of(&self, partner_id: Uuid) -> Option<Side> {
        if partner_id == self.buyer_partner_id {
            Some(Side::Buyer)
        } else if partner_id == self.seller_partner_id {
            Some(Side::Seller)
        } else {
            None
        }
    }
}
