use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Availability, Commodity, Requirement};
use crate::events::Event;
use crate::matching::MatchToken;
use crate::negotiation::{Negotiation, NegotiationMessage, NegotiationOffer};
use crate::trade::Trade;

use super::schema::SCHEMA_SQL;

/// Shared handle to the trading core's SQLite database. Cloning is cheap:
/// the connection itself is behind a mutex, same as the teacher's
/// `DbSignalStorage`.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

fn region_of(delivery: &serde_json::Value) -> Option<String> {
    delivery
        .get("region")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path.starts_with("memory://") || path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .context("failed to open database connection")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to apply schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- requirements ---------------------------------------------------

    pub fn upsert_requirement(&self, req: &Requirement) -> Result<()> {
        let body = serde_json::to_string(req)?;
        let delivery = serde_json::to_value(&req.delivery_location)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO requirements (id, buyer_partner_id, commodity_id, region, status, version, risk_state, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                status=excluded.status, version=excluded.version, risk_state=excluded.risk_state,
                body=excluded.body, updated_at=excluded.updated_at, region=excluded.region",
            params![
                req.id.to_string(),
                req.buyer_partner_id.to_string(),
                req.commodity_id.to_string(),
                region_of(&delivery),
                format!("{:?}", req.status).to_uppercase(),
                req.version,
                format!("{:?}", req.risk_state).to_uppercase(),
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_requirement(&self, id: Uuid) -> Result<Option<Requirement>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM requirements WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    pub fn active_requirements_for_commodity(&self, commodity_id: Uuid) -> Result<Vec<Requirement>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body FROM requirements WHERE commodity_id = ?1 AND status = 'ACTIVE'",
        )?;
        let rows = stmt.query_map(params![commodity_id.to_string()], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    // ---- availabilities ---------------------------------------------------

    pub fn upsert_availability(&self, avail: &Availability) -> Result<()> {
        let body = serde_json::to_string(avail)?;
        let delivery = serde_json::to_value(&avail.delivery_location)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO availabilities (id, seller_partner_id, commodity_id, region, status, version, risk_state, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                status=excluded.status, version=excluded.version, risk_state=excluded.risk_state,
                body=excluded.body, updated_at=excluded.updated_at, region=excluded.region",
            params![
                avail.id.to_string(),
                avail.seller_partner_id.to_string(),
                avail.commodity_id.to_string(),
                region_of(&delivery),
                format!("{:?}", avail.status).to_uppercase(),
                avail.version,
                format!("{:?}", avail.risk_state).to_uppercase(),
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_availability(&self, id: Uuid) -> Result<Option<Availability>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM availabilities WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    pub fn active_availabilities_for_commodity(&self, commodity_id: Uuid) -> Result<Vec<Availability>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body FROM availabilities WHERE commodity_id = ?1 AND status = 'ACTIVE'",
        )?;
        let rows = stmt.query_map(params![commodity_id.to_string()], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    /// Optimistic-lock compare-and-swap used by the matching engine's
    /// reservation path: succeeds only if the stored version still matches.
    pub fn cas_update_availability(&self, next: &Availability, expected_version: i64) -> Result<bool> {
        let body = serde_json::to_string(next)?;
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE availabilities SET body = ?1, status = ?2, version = ?3, updated_at = ?4
             WHERE id = ?5 AND version = ?6",
            params![
                body,
                format!("{:?}", next.status).to_uppercase(),
                next.version,
                Utc::now().to_rfc3339(),
                next.id.to_string(),
                expected_version,
            ],
        )?;
        Ok(updated == 1)
    }

    // ---- commodities ----------------------------------------------------
    // Commodity master data is owned by an external catalog module; this
    // core only persists the shaped slice (id, quality schema) it needs to
    // validate and score against.

    pub fn upsert_commodity(&self, commodity: &Commodity) -> Result<()> {
        let body = serde_json::to_string(commodity)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO commodities (id, name, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, body=excluded.body",
            params![commodity.id.to_string(), commodity.name, body],
        )?;
        Ok(())
    }

    pub fn get_commodity(&self, id: Uuid) -> Result<Option<Commodity>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row("SELECT body FROM commodities WHERE id = ?1", params![id.to_string()], |r| r.get(0))
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    // ---- match tokens -------------------------------------------------

    pub fn insert_match_token(&self, token: &MatchToken) -> Result<()> {
        let conn = self.conn.lock();
        insert_match_token_conn(&conn, token)
    }

    /// Issues a match token and its `match.found` (or allocation-failure)
    /// event atomically, so a crash between the two can never leave a token
    /// with no corresponding event in the log.
    pub fn insert_match_token_with_event(&self, token: &MatchToken, event: Event) -> Result<()> {
        self.with_outbox(vec![event], |tx| insert_match_token_conn(tx, token))
    }

    pub fn find_match_token_by_id(&self, id: Uuid) -> Result<Option<MatchToken>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM match_tokens WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    pub fn find_match_token_by_handle(&self, handle: &str) -> Result<Option<MatchToken>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM match_tokens WHERE buyer_handle = ?1 OR seller_handle = ?1",
                params![handle],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    pub fn recent_dedup_keys(&self, since_secs_ago: i64) -> Result<Vec<String>> {
        // dedup keys are stored inline in the token body's score_breakdown;
        // for lookups we scan recent tokens, which is bounded by the 15
        // minute suppression window.
        let conn = self.conn.lock();
        let cutoff = (Utc::now() - chrono::Duration::seconds(since_secs_ago)).to_rfc3339();
        let mut stmt = conn.prepare("SELECT body FROM match_tokens WHERE created_at >= ?1")?;
        let rows = stmt.query_map(params![cutoff], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        let tokens: Vec<MatchToken> = decode_all(rows)?;
        Ok(tokens.into_iter().map(|t| t.dedup_key.clone()).collect())
    }

    pub fn update_match_token_disclosure(&self, token: &MatchToken) -> Result<()> {
        let body = serde_json::to_string(token)?;
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE match_tokens SET body = ?1, disclosure_level = ?2 WHERE id = ?3",
            params![
                body,
                format!("{:?}", token.disclosure_level).to_uppercase(),
                token.id.to_string()
            ],
        )?;
        Ok(())
    }

    // ---- negotiations ---------------------------------------------------

    pub fn upsert_negotiation(&self, neg: &Negotiation) -> Result<()> {
        let conn = self.conn.lock();
        upsert_negotiation_conn(&conn, neg)
    }

    /// Persists the negotiation's terminal write for one state-machine step
    /// (offer supersession, new offer, message) together with the events
    /// that describe it, in a single transaction.
    pub fn negotiation_offer_with_events(
        &self,
        neg: &Negotiation,
        superseded: &[NegotiationOffer],
        new_offer: &NegotiationOffer,
        events: Vec<Event>,
    ) -> Result<()> {
        self.with_outbox(events, |tx| {
            for prior in superseded {
                update_offer_conn(tx, prior)?;
            }
            insert_offer_conn(tx, neg.id, new_offer)?;
            upsert_negotiation_conn(tx, neg)?;
            Ok(())
        })
    }

    /// Negotiation write for a step that settles an existing offer (accept,
    /// or reject-without-counter) without creating a new one.
    pub fn negotiation_transition_with_events(
        &self,
        neg: &Negotiation,
        offer_update: Option<&NegotiationOffer>,
        events: Vec<Event>,
    ) -> Result<()> {
        self.with_outbox(events, |tx| {
            if let Some(offer) = offer_update {
                update_offer_conn(tx, offer)?;
            }
            upsert_negotiation_conn(tx, neg)?;
            Ok(())
        })
    }

    /// Negotiation write paired with a message append (start's opening
    /// message, a participant message, or the sweeper's expiry notice).
    pub fn negotiation_message_with_events(
        &self,
        neg: &Negotiation,
        message: &NegotiationMessage,
        events: Vec<Event>,
    ) -> Result<()> {
        self.with_outbox(events, |tx| {
            insert_message_conn(tx, neg.id, message)?;
            upsert_negotiation_conn(tx, neg)?;
            Ok(())
        })
    }

    /// Plain negotiation write with no accompanying offer/message row
    /// (negotiation.started with no opening message).
    pub fn upsert_negotiation_with_events(&self, neg: &Negotiation, events: Vec<Event>) -> Result<()> {
        self.with_outbox(events, |tx| upsert_negotiation_conn(tx, neg))
    }

    pub fn get_negotiation(&self, id: Uuid) -> Result<Option<Negotiation>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM negotiations WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    pub fn negotiation_for_token(&self, match_token_id: Uuid) -> Result<Option<Negotiation>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM negotiations WHERE match_token_id = ?1",
                params![match_token_id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    /// Negotiations touching a given partner on either side, newest first;
    /// backs both `GET /negotiations` (filtered by the caller) and the
    /// read-only admin listing (unfiltered, via `all_negotiations`).
    pub fn negotiations_for_partner(&self, partner_id: Uuid) -> Result<Vec<Negotiation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body FROM negotiations WHERE buyer_partner_id = ?1 OR seller_partner_id = ?1
             ORDER BY last_activity_at DESC",
        )?;
        let rows = stmt.query_map(params![partner_id.to_string()], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    pub fn all_negotiations(&self) -> Result<Vec<Negotiation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT body FROM negotiations ORDER BY last_activity_at DESC")?;
        let rows = stmt.query_map([], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    pub fn non_terminal_negotiations_past(&self, cutoff_rfc3339: &str) -> Result<Vec<Negotiation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body FROM negotiations WHERE status IN ('INITIATED','IN_PROGRESS') AND expires_at <= ?1",
        )?;
        let rows = stmt.query_map(params![cutoff_rfc3339], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    pub fn insert_offer(&self, negotiation_id: Uuid, offer: &NegotiationOffer) -> Result<()> {
        let conn = self.conn.lock();
        insert_offer_conn(&conn, negotiation_id, offer)
    }

    pub fn update_offer(&self, offer: &NegotiationOffer) -> Result<()> {
        let conn = self.conn.lock();
        update_offer_conn(&conn, offer)
    }

    /// Marks a countered offer rejected ahead of the counter-offer that
    /// replaces it; no event of its own, the counter-offer's
    /// `negotiation.offer_made` event is what gets emitted.
    pub fn reject_offer_pending_counter(&self, offer: &NegotiationOffer) -> Result<()> {
        self.with_outbox(vec![], |tx| update_offer_conn(tx, offer))
    }

    pub fn offers_for_negotiation(&self, negotiation_id: Uuid) -> Result<Vec<NegotiationOffer>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body FROM negotiation_offers WHERE negotiation_id = ?1 ORDER BY round_number ASC",
        )?;
        let rows = stmt.query_map(params![negotiation_id.to_string()], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    pub fn insert_message(&self, negotiation_id: Uuid, message: &NegotiationMessage) -> Result<()> {
        let conn = self.conn.lock();
        insert_message_conn(&conn, negotiation_id, message)
    }

    pub fn messages_for_negotiation(&self, negotiation_id: Uuid) -> Result<Vec<NegotiationMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT body FROM negotiation_messages WHERE negotiation_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![negotiation_id.to_string()], |r| {
            let body: String = r.get(0)?;
            Ok(body)
        })?;
        decode_all(rows)
    }

    // ---- trades ---------------------------------------------------

    pub fn upsert_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.conn.lock();
        upsert_trade_conn(&conn, trade)
    }

    /// Persists a trade state change together with the event(s) that
    /// describe it in a single transaction (a signature can produce both
    /// `trade.signed` and `trade.activated` at once).
    pub fn upsert_trade_with_events(&self, trade: &Trade, events: Vec<Event>) -> Result<()> {
        self.with_outbox(events, |tx| upsert_trade_conn(tx, trade))
    }

    pub fn get_trade(&self, id: Uuid) -> Result<Option<Trade>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM trades WHERE id = ?1",
                params![id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match body {
            Some(b) => Some(serde_json::from_str(&b)?),
            None => None,
        })
    }

    /// Buyer-to-seller edges from every open negotiation or non-terminal
    /// trade touched within the lookback window, for the bilateral risk
    /// evaluator's circular-position check: if the candidate seller can
    /// already reach the candidate buyer through these edges, the new pair
    /// would close a cycle.
    pub fn open_position_edges(&self, lookback_days: i64) -> Result<Vec<(Uuid, Uuid)>> {
        let cutoff = (Utc::now() - chrono::Duration::days(lookback_days)).to_rfc3339();
        let conn = self.conn.lock();
        let mut edges = Vec::new();

        let mut neg_stmt = conn.prepare(
            "SELECT buyer_partner_id, seller_partner_id FROM negotiations
             WHERE status IN ('INITIATED', 'IN_PROGRESS', 'ACCEPTED') AND last_activity_at >= ?1",
        )?;
        let neg_rows = neg_stmt.query_map(params![cutoff], |r| {
            let buyer: String = r.get(0)?;
            let seller: String = r.get(1)?;
            Ok((buyer, seller))
        })?;
        for row in neg_rows {
            let (buyer, seller) = row?;
            edges.push((Uuid::parse_str(&buyer)?, Uuid::parse_str(&seller)?));
        }

        let mut trade_stmt = conn.prepare(
            "SELECT buyer_partner_id, seller_partner_id FROM trades
             WHERE status NOT IN ('CANCELLED', 'COMPLETED') AND updated_at >= ?1",
        )?;
        let trade_rows = trade_stmt.query_map(params![cutoff], |r| {
            let buyer: String = r.get(0)?;
            let seller: String = r.get(1)?;
            Ok((buyer, seller))
        })?;
        for row in trade_rows {
            let (buyer, seller) = row?;
            edges.push((Uuid::parse_str(&buyer)?, Uuid::parse_str(&seller)?));
        }

        Ok(edges)
    }

    // ---- events (outbox) -------------------------------------------------

    /// Appends zero or more events in the same transaction as an arbitrary
    /// state mutation `f`, so the write and the events either both land or
    /// both fail. This is the durability boundary every aggregate write
    /// with an accompanying event routes through.
    pub fn with_outbox<F, T>(&self, events: Vec<Event>, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        for event in &events {
            insert_event_tx(&tx, event)?;
        }
        tx.commit()?;
        Ok(result)
    }

    pub fn append_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock();
        insert_event_row(&conn, event)
    }

    pub fn read_events(&self, aggregate_type: &str, aggregate_id: Uuid) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, event_type, version, aggregate_type, aggregate_id, actor_id, occurred_at, correlation_id, payload
             FROM events WHERE aggregate_type = ?1 AND aggregate_id = ?2 ORDER BY occurred_at ASC",
        )?;
        let rows = stmt.query_map(params![aggregate_type, aggregate_id.to_string()], |r| {
            let id: String = r.get(0)?;
            let event_type: String = r.get(1)?;
            let version: u32 = r.get(2)?;
            let aggregate_type: String = r.get(3)?;
            let aggregate_id: String = r.get(4)?;
            let actor_id: Option<String> = r.get(5)?;
            let occurred_at: String = r.get(6)?;
            let correlation_id: String = r.get(7)?;
            let payload: String = r.get(8)?;
            Ok((
                id,
                event_type,
                version,
                aggregate_type,
                aggregate_id,
                actor_id,
                occurred_at,
                correlation_id,
                payload,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, event_type, version, aggregate_type, aggregate_id, actor_id, occurred_at, correlation_id, payload) = row?;
            out.push(Event {
                id: Uuid::parse_str(&id)?,
                event_type,
                version,
                aggregate_type,
                aggregate_id: Uuid::parse_str(&aggregate_id)?,
                actor_id: actor_id.and_then(|s| Uuid::parse_str(&s).ok()),
                occurred_at: chrono::DateTime::parse_from_rfc3339(&occurred_at)?.with_timezone(&Utc),
                correlation_id: Uuid::parse_str(&correlation_id)?,
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(out)
    }

    pub fn dead_letter(&self, event_id: Uuid, consumer: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO event_dead_letters (id, event_id, consumer, error, attempts, next_retry_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                Uuid::new_v4().to_string(),
                event_id.to_string(),
                consumer,
                error,
                (Utc::now() + chrono::Duration::seconds(30)).to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ---- idempotency -------------------------------------------------

    pub fn get_idempotent(&self, key: &str) -> Result<Option<(String, String, u16)>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT request_fingerprint, response_body, response_status FROM idempotency_keys WHERE key = ?1",
            params![key],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn put_idempotent(&self, key: &str, fingerprint: &str, body: &str, status: u16) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO idempotency_keys (key, request_fingerprint, response_body, response_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, fingerprint, body, status, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn purge_idempotent_older_than(&self, ttl_hours: i64) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::hours(ttl_hours)).to_rfc3339();
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM idempotency_keys WHERE created_at < ?1",
            params![cutoff],
        )?)
    }
}

fn upsert_negotiation_conn(conn: &Connection, neg: &Negotiation) -> Result<()> {
    let body = serde_json::to_string(neg)?;
    conn.execute(
        "INSERT INTO negotiations (id, match_token_id, requirement_id, availability_id, buyer_partner_id, seller_partner_id, status, current_round, last_activity_at, expires_at, trade_id, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
            status=excluded.status, current_round=excluded.current_round,
            last_activity_at=excluded.last_activity_at, trade_id=excluded.trade_id, body=excluded.body",
        params![
            neg.id.to_string(),
            neg.match_token_id.to_string(),
            neg.requirement_id.to_string(),
            neg.availability_id.to_string(),
            neg.buyer_partner_id.to_string(),
            neg.seller_partner_id.to_string(),
            format!("{:?}", neg.status).to_uppercase(),
            neg.current_round,
            neg.last_activity_at.to_rfc3339(),
            neg.expires_at.to_rfc3339(),
            neg.trade_id.map(|id| id.to_string()),
            body,
        ],
    )?;
    Ok(())
}

fn insert_offer_conn(conn: &Connection, negotiation_id: Uuid, offer: &NegotiationOffer) -> Result<()> {
    let body = serde_json::to_string(offer)?;
    conn.execute(
        "INSERT INTO negotiation_offers (id, negotiation_id, round_number, offered_by, status, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            offer.id.to_string(),
            negotiation_id.to_string(),
            offer.round_number,
            format!("{:?}", offer.offered_by).to_uppercase(),
            format!("{:?}", offer.status).to_uppercase(),
            body,
        ],
    )?;
    Ok(())
}

fn update_offer_conn(conn: &Connection, offer: &NegotiationOffer) -> Result<()> {
    let body = serde_json::to_string(offer)?;
    conn.execute(
        "UPDATE negotiation_offers SET status = ?1, body = ?2 WHERE id = ?3",
        params![
            format!("{:?}", offer.status).to_uppercase(),
            body,
            offer.id.to_string()
        ],
    )?;
    Ok(())
}

fn insert_message_conn(conn: &Connection, negotiation_id: Uuid, message: &NegotiationMessage) -> Result<()> {
    let body = serde_json::to_string(message)?;
    conn.execute(
        "INSERT INTO negotiation_messages (id, negotiation_id, sender, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id.to_string(),
            negotiation_id.to_string(),
            format!("{:?}", message.sender).to_uppercase(),
            body,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn upsert_trade_conn(conn: &Connection, trade: &Trade) -> Result<()> {
    let body = serde_json::to_string(trade)?;
    conn.execute(
        "INSERT INTO trades (id, negotiation_id, buyer_partner_id, seller_partner_id, status, contract_hash, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            status=excluded.status, contract_hash=excluded.contract_hash, body=excluded.body, updated_at=excluded.updated_at",
        params![
            trade.id.to_string(),
            trade.negotiation_id.to_string(),
            trade.buyer_partner_id.to_string(),
            trade.seller_partner_id.to_string(),
            format!("{:?}", trade.status).to_uppercase(),
            trade.contract_hash.clone(),
            body,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_match_token_conn(conn: &Connection, token: &MatchToken) -> Result<()> {
    let body = serde_json::to_string(token)?;
    conn.execute(
        "INSERT INTO match_tokens (id, requirement_id, availability_id, buyer_handle, seller_handle, score, disclosure_level, body, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            token.id.to_string(),
            token.requirement_id.to_string(),
            token.availability_id.to_string(),
            token.anonymous_token_buyer,
            token.anonymous_token_seller,
            token.score,
            format!("{:?}", token.disclosure_level).to_uppercase(),
            body,
            token.created_at.to_rfc3339(),
            token.expires_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_event_row(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (id, event_type, version, aggregate_type, aggregate_id, actor_id, occurred_at, correlation_id, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.id.to_string(),
            event.event_type,
            event.version,
            event.aggregate_type,
            event.aggregate_id.to_string(),
            event.actor_id.map(|id| id.to_string()),
            event.occurred_at.to_rfc3339(),
            event.correlation_id.to_string(),
            serde_json::to_string(&event.payload)?,
        ],
    )?;
    Ok(())
}

fn insert_event_tx(tx: &rusqlite::Transaction, event: &Event) -> Result<()> {
    tx.execute(
        "INSERT INTO events (id, event_type, version, aggregate_type, aggregate_id, actor_id, occurred_at, correlation_id, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.id.to_string(),
            event.event_type,
            event.version,
            event.aggregate_type,
            event.aggregate_id.to_string(),
            event.actor_id.map(|id| id.to_string()),
            event.occurred_at.to_rfc3339(),
            event.correlation_id.to_string(),
            serde_json::to_string(&event.payload)?,
        ],
    )?;
    Ok(())
}

fn decode_all<T, I>(rows: I) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: Iterator<Item = rusqlite::Result<String>>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(serde_json::from_str(&row?)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let db = Db::open(":memory:").unwrap();
        assert!(db.get_requirement(Uuid::new_v4()).unwrap().is_none());
    }
}
