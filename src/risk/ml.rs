//! ML opinion hook. The platform's AI/ML orchestrator is an external
//! collaborator (see SCOPE); this crate depends only on the narrow decision
//! interface the rule engine blends in.

use super::context::RiskContext;

#[derive(Debug, Clone)]
pub struct MlOpinion {
    pub score: f64,
    pub feature_importances: Vec<(String, f64)>,
}

pub trait MlProvider: Send + Sync {
    /// Returns `None` when no model is loaded for this context; the caller
    /// degrades to rule-only scoring rather than treating this as failure.
    fn score(&self, context: &RiskContext) -> Option<MlOpinion>;
}

/// Default provider used when `MODEL_DIR` is unset or empty at startup.
pub struct NoopMlProvider;

impl MlProvider for NoopMlProvider {
    fn score(&self, _context: &RiskContext) -> Option<MlOpinion> {
        None
    }
}
