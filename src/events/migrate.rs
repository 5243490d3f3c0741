//! Schema migrators: readers declare a minimum version; a registered chain
//! of migrators upgrades older payloads before delivery.

use serde_json::Value;
use std::collections::HashMap;

use super::Event;

pub trait EventMigrator: Send + Sync {
    fn event_type(&self) -> &str;
    fn from_version(&self) -> u32;
    fn migrate(&self, payload: Value) -> Value;
}

#[derive(Default)]
pub struct MigratorRegistry {
    by_key: HashMap<(String, u32), Box<dyn EventMigrator>>,
}

impl MigratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, migrator: Box<dyn EventMigrator>) {
        let key = (migrator.event_type().to_string(), migrator.from_version());
        self.by_key.insert(key, migrator);
    }

    /// Walk an event forward one version at a time until no migrator claims
    /// the current version, then return it at whatever version it reached.
    pub fn upgrade(&self, mut event: Event) -> Event {
        loop {
            let key = (event.event_type.clone(), event.version);
            match self.by_key.get(&key) {
                Some(migrator) => {
                    event.payload = migrator.migrate(event.payload);
                    event.version += 1;
                }
                None => return event,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    struct AddCurrencyField;

    impl EventMigrator for AddCurrencyField {
        fn event_type(&self) -> &str {
            "trade.activated"
        }
        fn from_version(&self) -> u32 {
            1
        }
        fn migrate(&self, mut payload: Value) -> Value {
            payload["currency"] = json!("INR");
            payload
        }
    }

    #[test]
    fn upgrades_v1_payload_to_v2() {
        let mut registry = MigratorRegistry::new();
        registry.register(Box::new(AddCurrencyField));

        let event = Event::new(
            "trade.activated",
            1,
            "trade",
            Uuid::new_v4(),
            None,
            Uuid::new_v4(),
            json!({ "amount": 100 }),
        );
        let upgraded = registry.upgrade(event);
        assert_eq!(upgraded.version, 2);
        assert_eq!(upgraded.payload["currency"], "INR");
    }

    #[test]
    fn leaves_unmigrated_events_untouched() {
        let registry = MigratorRegistry::new();
        let event = Event::new(
            "requirement.created",
            1,
            "requirement",
            Uuid::new_v4(),
            None,
            Uuid::new_v4(),
            json!({}),
        );
        let same = registry.upgrade(event.clone());
        assert_eq!(same.version, event.version);
    }
}
