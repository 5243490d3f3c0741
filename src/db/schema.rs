//! Relational layout. Large free-form fields (quality specs, addresses,
//! term documents) are stored as opaque JSON TEXT columns and parsed at the
//! repository boundary; only the columns the spec calls out for filtering
//! are indexed.

pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS requirements (
    id TEXT PRIMARY KEY,
    buyer_partner_id TEXT NOT NULL,
    commodity_id TEXT NOT NULL,
    region TEXT,
    status TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    risk_state TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_requirements_commodity_status
    ON requirements(commodity_id, status, region);

CREATE TABLE IF NOT EXISTS availabilities (
    id TEXT PRIMARY KEY,
    seller_partner_id TEXT NOT NULL,
    commodity_id TEXT NOT NULL,
    region TEXT,
    status TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    risk_state TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_availabilities_commodity_status
    ON availabilities(commodity_id, status, region);

CREATE TABLE IF NOT EXISTS match_tokens (
    id TEXT PRIMARY KEY,
    requirement_id TEXT NOT NULL,
    availability_id TEXT NOT NULL,
    buyer_handle TEXT NOT NULL UNIQUE,
    seller_handle TEXT NOT NULL UNIQUE,
    score REAL NOT NULL,
    disclosure_level TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_match_tokens_pair ON match_tokens(requirement_id, availability_id);

CREATE TABLE IF NOT EXISTS negotiations (
    id TEXT PRIMARY KEY,
    match_token_id TEXT NOT NULL UNIQUE,
    requirement_id TEXT NOT NULL,
    availability_id TEXT NOT NULL,
    buyer_partner_id TEXT NOT NULL,
    seller_partner_id TEXT NOT NULL,
    status TEXT NOT NULL,
    current_round INTEGER NOT NULL DEFAULT 0,
    last_activity_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    trade_id TEXT,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_negotiations_status ON negotiations(status, expires_at);

CREATE TABLE IF NOT EXISTS negotiation_offers (
    id TEXT PRIMARY KEY,
    negotiation_id TEXT NOT NULL,
    round_number INTEGER NOT NULL,
    offered_by TEXT NOT NULL,
    status TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE(negotiation_id, round_number)
);
CREATE INDEX IF NOT EXISTS idx_offers_negotiation ON negotiation_offers(negotiation_id);

CREATE TABLE IF NOT EXISTS negotiation_messages (
    id TEXT PRIMARY KEY,
    negotiation_id TEXT NOT NULL,
    sender TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_negotiation ON negotiation_messages(negotiation_id);

CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    negotiation_id TEXT NOT NULL UNIQUE,
    buyer_partner_id TEXT NOT NULL,
    seller_partner_id TEXT NOT NULL,
    status TEXT NOT NULL,
    contract_hash TEXT,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    version INTEGER NOT NULL,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    actor_id TEXT,
    occurred_at TEXT NOT NULL,
    correlation_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    seq INTEGER
);
CREATE INDEX IF NOT EXISTS idx_events_aggregate ON events(aggregate_type, aggregate_id, occurred_at);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);

CREATE TABLE IF NOT EXISTS event_dead_letters (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL,
    consumer TEXT NOT NULL,
    error TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    next_retry_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS commodities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS idempotency_keys (
    key TEXT PRIMARY KEY,
    request_fingerprint TEXT NOT NULL,
    response_body TEXT NOT NULL,
    response_status INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
"#;
