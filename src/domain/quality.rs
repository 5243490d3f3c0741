//! Quality is "any commodity via JSON" in the source system; here it is a
//! typed value union resolved once against the commodity's schema, so
//! scoring is a data-driven loop rather than reflection over opaque JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityParamType {
    Number,
    Bool,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityParamSpec {
    #[serde(rename = "type")]
    pub param_type: QualityParamType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mandatory: bool,
    /// Allowed deviation from the requested/offered value before the
    /// parameter is considered mismatched, expressed in the parameter's
    /// own unit.
    pub tolerance: Option<f64>,
}

/// A single declared value for a quality parameter: either an exact target
/// or a desired range, each with its own tolerance override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityValue {
    Exact { value: f64, tolerance: Option<f64> },
    Range { min: f64, max: f64 },
    Bool(bool),
    Text(String),
}

impl QualityValue {
    /// Closeness in [0, 1] between a requirement-side and an
    /// availability-side declaration of the same parameter, given the
    /// schema's default tolerance as a fallback.
    pub fn closeness(&self, other: &QualityValue, schema_tolerance: Option<f64>) -> f64 {
        match (self, other) {
            (
                QualityValue::Exact { value: a, tolerance: ta },
                QualityValue::Exact { value: b, .. },
            ) => {
                let tol = ta.or(schema_tolerance).unwrap_or(0.0);
                closeness_numeric(*a, *b, tol)
            }
            (QualityValue::Exact { value, tolerance }, QualityValue::Range { min, max })
            | (QualityValue::Range { min, max }, QualityValue::Exact { value, tolerance }) => {
                if *value >= *min && *value <= *max {
                    1.0
                } else {
                    let tol = tolerance.or(schema_tolerance).unwrap_or(0.0);
                    let dist = if *value < *min { min - value } else { value - max };
                    closeness_numeric(dist, 0.0, tol.max(f64::EPSILON))
                }
            }
            (QualityValue::Range { min: amin, max: amax }, QualityValue::Range { min: bmin, max: bmax }) => {
                let overlap = (amax.min(*bmax) - amin.max(*bmin)).max(0.0);
                let union = amax.max(*bmax) - amin.min(*bmin);
                if union <= 0.0 {
                    1.0
                } else {
                    overlap / union
                }
            }
            (QualityValue::Bool(a), QualityValue::Bool(b)) => {
                if a == b {
                    1.0
                } else {
                    0.0
                }
            }
            (QualityValue::Text(a), QualityValue::Text(b)) => {
                if a.eq_ignore_ascii_case(b) {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

fn closeness_numeric(a: f64, b: f64, tolerance: f64) -> f64 {
    let diff = (a - b).abs();
    if tolerance <= 0.0 {
        return if diff == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - diff / tolerance).clamp(0.0, 1.0)
}

/// parameter name -> declared value
pub type QualitySpec = HashMap<String, QualityValue>;
