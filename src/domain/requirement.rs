//! Requirement: buyer-side demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quality::QualitySpec;
use super::RiskState;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentType {
    DirectBuy,
    Negotiation,
    Auction,
    PriceDiscovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketVisibility {
    Public,
    Restricted,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequirementStatus {
    Draft,
    Active,
    Paused,
    Fulfilled,
    Cancelled,
    Expired,
    Blocked,
}

impl RequirementStatus {
    /// The status DAG: which transitions are legal.
    pub fn can_transition_to(self, next: RequirementStatus) -> bool {
        use RequirementStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Draft, Cancelled)
                | (Active, Paused)
                | (Active, Fulfilled)
                | (Active, Cancelled)
                | (Active, Expired)
                | (Active, Blocked)
                | (Paused, Active)
                | (Paused, Cancelled)
                | (Paused, Expired)
                | (Blocked, Active)
                | (Blocked, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryLocation {
    Registered { location_id: Uuid },
    AdHoc {
        address: String,
        lat: f64,
        lng: f64,
        region: String,
        pincode: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,
    pub buyer_partner_id: Uuid,
    pub buyer_branch_location_id: Option<Uuid>,
    pub commodity_id: Uuid,
    pub quantity: f64,
    pub unit: String,
    pub preferred_price: f64,
    pub max_price: f64,
    pub quality_spec: QualitySpec,
    pub delivery_location: DeliveryLocation,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub intent_type: IntentType,
    pub market_visibility: MarketVisibility,
    pub invited_seller_ids: Vec<Uuid>,
    pub urgency: u8,
    pub eod_cutoff: DateTime<Utc>,
    pub status: RequirementStatus,
    pub version: i64,
    pub risk_state: RiskState,
    pub embedding: Option<Vec<u8>>,
}

impl Requirement {
    /// Enforces: a RESTRICTED requirement must declare invitees, others must not.
    pub fn validate_visibility_invariant(&self) -> Result<(), AppError> {
        match self.market_visibility {
            MarketVisibility::Restricted if self.invited_seller_ids.is_empty() => {
                Err(AppError::ValidationFields(
                    "RESTRICTED requirement requires at least one invited seller".into(),
                    vec!["invitedSellerIds".into()],
                ))
            }
            MarketVisibility::Public | MarketVisibility::Private
                if !self.invited_seller_ids.is_empty() =>
            {
                Err(AppError::ValidationFields(
                    "invitedSellerIds only applies to RESTRICTED visibility".into(),
                    vec!["invitedSellerIds".into()],
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn is_visible_to(&self, seller_partner_id: Uuid) -> bool {
        match self.market_visibility {
            MarketVisibility::Public => true,
            MarketVisibility::Restricted => self.invited_seller_ids.contains(&seller_partner_id),
            MarketVisibility::Private => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_without_invitees_is_invalid() {
        let req = sample_requirement(MarketVisibility::Restricted, vec![]);
        assert!(req.validate_visibility_invariant().is_err());
    }

    #[test]
    fn public_with_invitees_is_invalid() {
        let req = sample_requirement(MarketVisibility::Public, vec![Uuid::new_v4()]);
        assert!(req.validate_visibility_invariant().is_err());
    }

    #[test]
    fn private_is_visible_to_nobody() {
        let req = sample_requirement(MarketVisibility::Private, vec![]);
        assert!(!req.is_visible_to(Uuid::new_v4()));
    }

    fn sample_requirement(vis: MarketVisibility, invited: Vec<Uuid>) -> Requirement {
        Requirement {
            id: Uuid::new_v4(),
            buyer_partner_id: Uuid::new_v4(),
            buyer_branch_location_id: None,
            commodity_id: Uuid::new_v4(),
            quantity: 50.0,
            unit: "quintal".into(),
            preferred_price: 7100.0,
            max_price: 7300.0,
            quality_spec: Default::default(),
            delivery_location: DeliveryLocation::AdHoc {
                address: "Ahmedabad".into(),
                lat: 23.03,
                lng: 72.58,
                region: "GJ".into(),
                pincode: "380001".into(),
            },
            delivery_window_start: Utc::now(),
            delivery_window_end: Utc::now() + chrono::Duration::days(7),
            intent_type: IntentType::Negotiation,
            market_visibility: vis,
            invited_seller_ids: invited,
            urgency: 1,
            eod_cutoff: Utc::now() + chrono::Duration::days(7),
            status: RequirementStatus::Draft,
            version: 0,
            risk_state: RiskState::Pending,
            embedding: None,
        }
    }
}
