//! Commodity master data (owned by an external module). The trading core
//! only needs the identifier and the quality parameter schema it defines,
//! which is what `Requirement.qualitySpec` / `Availability.qualitySpec`
//! are keyed against.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::quality::QualityParamSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commodity {
    pub id: Uuid,
    pub name: String,
    pub variety: Option<String>,
    pub default_trade_unit: String,
    pub default_rate_unit: String,
    pub default_base_unit: String,
    /// parameter name -> schema
    pub quality_schema: HashMap<String, QualityParamSpec>,
}

impl Commodity {
    pub fn mandatory_params(&self) -> impl Iterator<Item = &String> {
        self.quality_schema
            .iter()
            .filter(|(_, spec)| spec.mandatory)
            .map(|(name, _)| name)
    }
}
