//! Event Log (C1): append-only, ordered record of every state change.
//! Appends are the same durability boundary as the state change that
//! produced them (outbox discipline) — see `db::store::Db::with_outbox`.

pub mod log;
pub mod migrate;
pub mod model;

pub use log::{DeadLetter, EventLog};
pub use migrate::{EventMigrator, MigratorRegistry};
pub use model::Event;
