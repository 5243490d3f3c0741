use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const SCRUBBED_KEYS: &[&str] = &[
    "email", "phone", "password", "passwordHash", "token", "creditCard", "pan", "ssn",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String, // "<aggregate>.<verb>", versioned separately
    pub version: u32,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub payload: Value,
}

impl Event {
    pub fn new(
        event_type: impl Into<String>,
        version: u32,
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        actor_id: Option<Uuid>,
        correlation_id: Uuid,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            version,
            aggregate_type: aggregate_type.into(),
            aggregate_id,
            actor_id,
            occurred_at: Utc::now(),
            correlation_id,
            payload: scrub(payload),
        }
    }
}

/// Recursively removes well-known PII-bearing keys from a JSON payload
/// before it is written to the append-only log.
fn scrub(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !SCRUBBED_KEYS.iter().any(|s| s.eq_ignore_ascii_case(k)))
                .map(|(k, v)| (k, scrub(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(scrub).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scrubs_pii_keys_recursively() {
        let payload = json!({
            "requirementId": "abc",
            "buyer": { "email": "a@b.com", "phone": "123" },
            "note": "ok"
        });
        let event = Event::new(
            "requirement.created",
            1,
            "requirement",
            Uuid::new_v4(),
            None,
            Uuid::new_v4(),
            payload,
        );
        assert!(event.payload["buyer"].get("email").is_none());
        assert!(event.payload["buyer"].get("phone").is_none());
        assert_eq!(event.payload["note"], "ok");
    }
}
