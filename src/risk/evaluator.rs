use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::domain::RiskState;

use super::context::{BilateralContext, EntityContext, RiskContext};
use super::ml::MlProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub impact: f64,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskOutcome {
    pub status: RiskState,
    pub score: f64,
    pub rule_score: f64,
    pub ml_score: Option<f64>,
    pub breakdown: Vec<RiskFactor>,
    pub explanation: String,
}

const PASS_THRESHOLD: f64 = 80.0;
const WARN_THRESHOLD: f64 = 60.0;

pub struct RiskEvaluator {
    ml: Box<dyn MlProvider>,
}

impl RiskEvaluator {
    pub fn new(ml: Box<dyn MlProvider>) -> Self {
        Self { ml }
    }

    pub fn with_noop_ml() -> Self {
        Self::new(Box::new(super::ml::NoopMlProvider))
    }

    pub fn evaluate(&self, context: &RiskContext) -> RiskOutcome {
        let mut breakdown = Vec::new();

        if let Some(reason) = hard_blocker(context, &mut breakdown) {
            metrics::counter!("tradecore_risk_verdicts_total", "status" => "FAIL").increment(1);
            return RiskOutcome {
                status: RiskState::Fail,
                score: 0.0,
                rule_score: 0.0,
                ml_score: None,
                breakdown,
                explanation: reason,
            };
        }

        let rule_score = rule_score(context, &mut breakdown);

        // An ML provider is an external collaborator; a panic inside it is
        // treated the same as "no opinion available" rather than bubbling up,
        // since this is not a hard blocker path.
        let ml_opinion = match panic::catch_unwind(AssertUnwindSafe(|| self.ml.score(context))) {
            Ok(opinion) => opinion,
            Err(_) => {
                warn!("ml provider panicked during risk evaluation, degrading to rule-only");
                None
            }
        };

        let (final_score, ml_score) = match &ml_opinion {
            Some(opinion) => {
                for (feature, importance) in &opinion.feature_importances {
                    breakdown.push(RiskFactor {
                        factor: format!("ml:{feature}"),
                        impact: *importance,
                        value: json!(opinion.score),
                    });
                }
                (0.70 * rule_score + 0.30 * opinion.score, Some(opinion.score))
            }
            None => {
                warn!("no ml opinion available, scoring rule-only");
                (rule_score, None)
            }
        };

        let status = if final_score >= PASS_THRESHOLD {
            RiskState::Pass
        } else if final_score >= WARN_THRESHOLD {
            RiskState::Warn
        } else {
            RiskState::Fail
        };

        let explanation = match status {
            RiskState::Pass => "within acceptable risk parameters".to_string(),
            RiskState::Warn => "elevated risk; review recommended before proceeding".to_string(),
            RiskState::Fail => "risk score below acceptance threshold".to_string(),
            RiskState::Pending => unreachable!("evaluator never returns PENDING"),
        };

        let status_label = match status {
            RiskState::Pass => "PASS",
            RiskState::Warn => "WARN",
            RiskState::Fail => "FAIL",
            RiskState::Pending => "PENDING",
        };
        metrics::counter!("tradecore_risk_verdicts_total", "status" => status_label).increment(1);

        RiskOutcome {
            status,
            score: final_score.round(),
            rule_score: rule_score.round(),
            ml_score,
            breakdown,
            explanation,
        }
    }
}

fn hard_blocker(context: &RiskContext, breakdown: &mut Vec<RiskFactor>) -> Option<String> {
    for entity in context.entities() {
        if entity.sanctions_hit {
            breakdown.push(RiskFactor {
                factor: "sanctions_hit".into(),
                impact: -100.0,
                value: json!(entity.partner_id),
            });
            return Some("sanctions hit".to_string());
        }
        if !entity.has_required_capability() {
            breakdown.push(RiskFactor {
                factor: "invalid_capability".into(),
                impact: -100.0,
                value: json!(entity.required_capability),
            });
            return Some("actor lacks the required capability".to_string());
        }
        if entity.export_license_required && !entity.export_license_present {
            breakdown.push(RiskFactor {
                factor: "missing_export_license".into(),
                impact: -100.0,
                value: json!(entity.partner_id),
            });
            return Some("required export/import license absent".to_string());
        }
    }

    if let RiskContext::Bilateral(b) = context {
        if b.buyer.partner_id == b.seller.partner_id {
            breakdown.push(RiskFactor {
                factor: "wash_trading".into(),
                impact: -100.0,
                value: json!(b.buyer.partner_id),
            });
            return Some("same party on both sides".to_string());
        }
        if b.same_ultimate_beneficial_owner {
            breakdown.push(RiskFactor {
                factor: "insider_trading".into(),
                impact: -100.0,
                value: json!({ "buyer": b.buyer.partner_id, "seller": b.seller.partner_id }),
            });
            return Some("matching parties share an ultimate beneficial owner".to_string());
        }
        if b.would_form_circular_position {
            breakdown.push(RiskFactor {
                factor: "circular_trading".into(),
                impact: -100.0,
                value: json!({ "buyer": b.buyer.partner_id, "seller": b.seller.partner_id }),
            });
            return Some("open positions would form a cycle".to_string());
        }
    }

    None
}

fn rule_score(context: &RiskContext, breakdown: &mut Vec<RiskFactor>) -> f64 {
    let entities = context.entities();
    let per_entity: Vec<f64> = entities
        .iter()
        .map(|e| entity_rule_score(e, breakdown))
        .collect();
    per_entity.iter().sum::<f64>() / per_entity.len().max(1) as f64
}

fn entity_rule_score(entity: &EntityContext, breakdown: &mut Vec<RiskFactor>) -> f64 {
    let credit = &entity.credit;

    let exposure_component = (100.0 - credit.credit_utilization_pct).clamp(0.0, 100.0) * 0.5
        + (100.0 - credit.exposure_ratio * 100.0).clamp(0.0, 100.0) * 0.5;
    let rating_component = credit.counterparty_rating.clamp(0.0, 100.0) * 0.7
        + (credit.counterparty_vintage_years * 10.0).clamp(0.0, 100.0) * 0.3;
    let history_component = credit.payment_history_score.clamp(0.0, 100.0) * 0.5
        + credit.delivery_history_score.clamp(0.0, 100.0) * 0.3
        + (100.0 - (credit.dispute_count as f64 * 15.0)).clamp(0.0, 100.0) * 0.2;

    breakdown.push(RiskFactor {
        factor: format!("credit_exposure:{}", entity.partner_id),
        impact: 0.40,
        value: json!(exposure_component.round()),
    });
    breakdown.push(RiskFactor {
        factor: format!("counterparty_rating:{}", entity.partner_id),
        impact: 0.30,
        value: json!(rating_component.round()),
    });
    breakdown.push(RiskFactor {
        factor: format!("payment_delivery_history:{}", entity.partner_id),
        impact: 0.30,
        value: json!(history_component.round()),
    });

    0.40 * exposure_component + 0.30 * rating_component + 0.30 * history_component
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use uuid::Uuid;

    fn good_entity(cap: Capability) -> EntityContext {
        EntityContext {
            partner_id: Uuid::new_v4(),
            pan_or_equivalent: Some("ABCDE1234F".into()),
            capabilities: vec![cap.clone()],
            required_capability: cap,
            credit: Default::default(),
            sanctions_hit: false,
            export_license_required: false,
            export_license_present: false,
        }
    }

    #[test]
    fn healthy_entity_passes() {
        let evaluator = RiskEvaluator::with_noop_ml();
        let ctx = RiskContext::Entity(good_entity(Capability::Sell));
        let outcome = evaluator.evaluate(&ctx);
        assert_eq!(outcome.status, RiskState::Pass);
        assert!(outcome.ml_score.is_none());
    }

    #[test]
    fn sanctions_hit_is_fail_regardless_of_score() {
        let evaluator = RiskEvaluator::with_noop_ml();
        let mut entity = good_entity(Capability::Buy);
        entity.sanctions_hit = true;
        let outcome = evaluator.evaluate(&RiskContext::Entity(entity));
        assert_eq!(outcome.status, RiskState::Fail);
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn wash_trading_blocked() {
        let evaluator = RiskEvaluator::with_noop_ml();
        let buyer = good_entity(Capability::Buy);
        let mut seller = good_entity(Capability::Sell);
        seller.partner_id = buyer.partner_id;
        let ctx = RiskContext::Bilateral(BilateralContext {
            buyer,
            seller,
            same_ultimate_beneficial_owner: false,
            would_form_circular_position: false,
            estimated_value: 1000.0,
        });
        let outcome = evaluator.evaluate(&ctx);
        assert_eq!(outcome.status, RiskState::Fail);
        assert!(outcome.explanation.contains("same party"));
    }

    #[test]
    fn missing_capability_blocks() {
        let evaluator = RiskEvaluator::with_noop_ml();
        let entity = good_entity(Capability::Transport);
        let outcome = evaluator.evaluate(&RiskContext::Entity(entity));
        assert_eq!(outcome.status, RiskState::Fail);
    }

    #[test]
    fn poor_credit_warns_or_fails() {
        let evaluator = RiskEvaluator::with_noop_ml();
        let mut entity = good_entity(Capability::Buy);
        entity.credit.credit_utilization_pct = 95.0;
        entity.credit.counterparty_rating = 20.0;
        entity.credit.payment_history_score = 10.0;
        entity.credit.dispute_count = 5;
        let outcome = evaluator.evaluate(&RiskContext::Entity(entity));
        assert_ne!(outcome.status, RiskState::Pass);
    }
}
