//! Availability: seller-side supply, mirror of Requirement plus the
//! quantity bookkeeping invariant that the matching engine's reservation
//! logic depends on: reserved + available + sold == total, always.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::quality::QualitySpec;
use super::requirement::{DeliveryLocation, MarketVisibility};
use super::RiskState;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AvailabilityIntent {
    Spot,
    Booking,
    Contract,
    Otc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AvailabilityStatus {
    Draft,
    Active,
    Paused,
    Sold,
    Cancelled,
    Expired,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub id: Uuid,
    pub seller_partner_id: Uuid,
    pub seller_branch_location_id: Option<Uuid>,
    pub commodity_id: Uuid,
    pub total_quantity: f64,
    pub available_quantity: f64,
    pub reserved_quantity: f64,
    pub sold_quantity: f64,
    pub unit: String,
    pub asking_price: f64,
    pub allow_partial_order: bool,
    pub min_order_quantity: f64,
    pub quality_spec: QualitySpec,
    pub delivery_location: DeliveryLocation,
    pub delivery_window_start: DateTime<Utc>,
    pub delivery_window_end: DateTime<Utc>,
    pub intent_type: AvailabilityIntent,
    pub market_visibility: MarketVisibility,
    pub invited_buyer_ids: Vec<Uuid>,
    pub approval_status: ApprovalStatus,
    pub eod_cutoff: DateTime<Utc>,
    pub status: AvailabilityStatus,
    pub version: i64,
    pub risk_state: RiskState,
    pub embedding: Option<Vec<u8>>,
}

impl Availability {
    pub fn invariant_holds(&self) -> bool {
        let sum = self.reserved_quantity + self.available_quantity + self.sold_quantity;
        (sum - self.total_quantity).abs() < 1e-6 && self.available_quantity >= -1e-9
    }

    pub fn can_reserve(&self, quantity: f64) -> bool {
        if quantity <= 0.0 {
            return false;
        }
        if !self.allow_partial_order && (quantity - self.total_quantity).abs() > 1e-9 {
            // full-order-only availabilities must be reserved exactly in full
            return false;
        }
        if quantity < self.min_order_quantity - 1e-9 {
            return false;
        }
        self.available_quantity + 1e-9 >= quantity
            && matches!(self.status, AvailabilityStatus::Active)
    }

    /// Reserve `quantity` against this availability, returning the new
    /// state. Never mutates in place: the caller (matching engine) applies
    /// this against a freshly loaded row under an optimistic-lock
    /// `WHERE version = ?` update, so this function must be pure.
    pub fn try_reserve(&self, quantity: f64) -> Result<Availability, AppError> {
        if !self.can_reserve(quantity) {
            return Err(AppError::Conflict("INSUFFICIENT_QUANTITY".into()));
        }
        let mut next = self.clone();
        next.available_quantity -= quantity;
        next.reserved_quantity += quantity;
        next.version += 1;
        if next.available_quantity <= 1e-9 && next.reserved_quantity + next.sold_quantity >= next.total_quantity - 1e-9
        {
            next.status = AvailabilityStatus::Sold;
        }
        debug_assert!(next.invariant_holds());
        Ok(next)
    }

    /// Release a previously reserved quantity back to available.
    pub fn release(&self, quantity: f64) -> Result<Availability, AppError> {
        if quantity <= 0.0 || quantity - self.reserved_quantity > 1e-9 {
            return Err(AppError::Validation("cannot release more than reserved".into()));
        }
        let mut next = self.clone();
        next.reserved_quantity -= quantity;
        next.available_quantity += quantity;
        next.version += 1;
        if next.available_quantity > 1e-9 && next.status == AvailabilityStatus::Sold {
            next.status = AvailabilityStatus::Active;
        }
        debug_assert!(next.invariant_holds());
        Ok(next)
    }

    /// Mirrors `Requirement::is_visible_to`: a PRIVATE or RESTRICTED
    /// availability must not surface to a buyer it was never meant to reach.
    pub fn is_visible_to(&self, buyer_partner_id: Uuid) -> bool {
        match self.market_visibility {
            MarketVisibility::Public => true,
            MarketVisibility::Restricted => self.invited_buyer_ids.contains(&buyer_partner_id),
            MarketVisibility::Private => false,
        }
    }

    /// Move reserved quantity into sold (settlement on trade creation).
    pub fn mark_sold(&self, quantity: f64) -> Result<Availability, AppError> {
        if quantity <= 0.0 || quantity - self.reserved_quantity > 1e-9 {
            return Err(AppError::Validation("cannot sell more than reserved".into()));
        }
        let mut next = self.clone();
        next.reserved_quantity -= quantity;
        next.sold_quantity += quantity;
        next.version += 1;
        if next.available_quantity <= 1e-9 && next.reserved_quantity <= 1e-9 {
            next.status = AvailabilityStatus::Sold;
        }
        debug_assert!(next.invariant_holds());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Availability {
        Availability {
            id: Uuid::new_v4(),
            seller_partner_id: Uuid::new_v4(),
            seller_branch_location_id: None,
            commodity_id: Uuid::new_v4(),
            total_quantity: 50.0,
            available_quantity: 50.0,
            reserved_quantity: 0.0,
            sold_quantity: 0.0,
            unit: "quintal".into(),
            asking_price: 7200.0,
            allow_partial_order: true,
            min_order_quantity: 1.0,
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
            intent_type: AvailabilityIntent::Spot,
            market_visibility: MarketVisibility::Public,
            invited_buyer_ids: vec![],
            approval_status: ApprovalStatus::Approved,
            eod_cutoff: Utc::now() + chrono::Duration::days(7),
            status: AvailabilityStatus::Active,
            version: 0,
            risk_state: RiskState::Pending,
            embedding: None,
        }
    }

    #[test]
    fn reserving_full_quantity_moves_to_sold() {
        let a = sample();
        let reserved = a.try_reserve(50.0).unwrap();
        assert_eq!(reserved.available_quantity, 0.0);
        assert_eq!(reserved.reserved_quantity, 50.0);
        assert_eq!(reserved.status, AvailabilityStatus::Sold);
        assert!(reserved.invariant_holds());
    }

    #[test]
    fn reserving_more_than_available_is_conflict() {
        let a = sample();
        assert!(a.try_reserve(51.0).is_err());
    }

    #[test]
    fn release_returns_quantity_and_reactivates() {
        let a = sample().try_reserve(50.0).unwrap();
        let released = a.release(50.0).unwrap();
        assert_eq!(released.available_quantity, 50.0);
        assert_eq!(released.status, AvailabilityStatus::Active);
    }

    #[test]
    fn available_never_goes_negative() {
        let a = sample();
        for _ in 0..3 {
            let _ = a.try_reserve(60.0); // always rejected, never mutates `a`
        }
        assert!(a.available_quantity >= 0.0);
    }

    #[test]
    fn private_availability_is_visible_to_nobody() {
        let mut a = sample();
        a.market_visibility = MarketVisibility::Private;
        assert!(!a.is_visible_to(Uuid::new_v4()));
    }

    #[test]
    fn restricted_availability_only_visible_to_invitees() {
        let invited = Uuid::new_v4();
        let mut a = sample();
        a.market_visibility = MarketVisibility::Restricted;
        a.invited_buyer_ids = vec![invited];
        assert!(a.is_visible_to(invited));
        assert!(!a.is_visible_to(Uuid::new_v4()));
    }
}
