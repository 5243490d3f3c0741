//! Partner is an opaque external identity, owned by the onboarding/KYC
//! module (out of scope here). We only carry the handle plus the shaped data
//! the trading core needs to reason about delivery and risk.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::Capability;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerRef {
    pub id: Uuid,
    pub capabilities: Vec<Capability>,
}

impl PartnerRef {
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub lat: f64,
    pub lng: f64,
    pub region: String,
    pub is_primary: bool,
}
