//! Core domain model: partners, commodities, requirements and availabilities.
//! Pure data + invariant-enforcing constructors; no I/O in this module.

pub mod availability;
pub mod commodity;
pub mod partner;
pub mod quality;
pub mod requirement;

pub use availability::{ApprovalStatus, Availability, AvailabilityIntent, AvailabilityStatus};
pub use commodity::Commodity;
pub use partner::{Location, PartnerRef};
pub use quality::{QualityParamSpec, QualitySpec, QualityValue};
pub use requirement::{
    DeliveryLocation, IntentType, MarketVisibility, Requirement, RequirementStatus,
};

use serde::{Deserialize, Serialize};

/// Hybrid rule/ML risk state attached to every requirement and availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskState {
    Pending,
    Pass,
    Warn,
    Fail,
}
