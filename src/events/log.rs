//! Append-only event log (C1). Every state-changing operation in the
//! matching, negotiation and trade engines appends through here in the
//! same transaction as its own persistence write, so a reader can always
//! reconstruct "what happened" without racing the aggregate tables.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::Db;

use super::migrate::MigratorRegistry;
use super::model::Event;

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event_id: Uuid,
    pub consumer: String,
    pub error: String,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
}

/// Thin wrapper over `Db` that owns the migrator registry used to upgrade
/// events to their current shape on read.
pub struct EventLog {
    db: Db,
    migrators: MigratorRegistry,
}

impl EventLog {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            migrators: MigratorRegistry::new(),
        }
    }

    pub fn with_migrators(db: Db, migrators: MigratorRegistry) -> Self {
        Self { db, migrators }
    }

    pub fn append(&self, event: &Event) -> Result<()> {
        self.db.append_event(event)
    }

    pub fn read(&self, aggregate_type: &str, aggregate_id: Uuid) -> Result<Vec<Event>> {
        let raw = self.db.read_events(aggregate_type, aggregate_id)?;
        Ok(raw
            .into_iter()
            .map(|e| self.migrators.upgrade(e))
            .collect())
    }

    /// Records a delivery failure for retry bookkeeping. Consumers (the
    /// real-time fan-out, external webhooks) call this when they cannot
    /// process an event instead of silently dropping it.
    pub fn dead_letter(&self, event_id: Uuid, consumer: &str, error: &str) -> Result<()> {
        self.db.dead_letter(event_id, consumer, error)
    }
}
