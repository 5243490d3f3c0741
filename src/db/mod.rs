//! Persistence: a single SQLite database (WAL mode, bundled driver) holding
//! every aggregate table plus the append-only event log. Mirrors the
//! teacher's `DbSignalStorage`: a `SCHEMA_SQL` constant applied once at
//! startup, a `parking_lot::Mutex<Connection>` behind an `Arc`.

pub mod schema;
pub mod store;

pub use store::Db;
