//! Shared handle every HTTP handler receives via axum's `State` extractor,
//! mirroring the teacher's single `AppState` struct cloned into each route.

use std::sync::Arc;

use crate::capability::CapabilityIssuer;
use crate::config::Config;
use crate::db::Db;
use crate::events::EventLog;
use crate::matching::{MatchTokenStore, MatchingEngine};
use crate::negotiation::NegotiationEngine;
use crate::realtime::RoomRegistry;
use crate::risk::RiskEvaluator;
use crate::trade::TradeEngine;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub events: Arc<EventLog>,
    pub risk: Arc<RiskEvaluator>,
    pub tokens: Arc<MatchTokenStore>,
    pub matching: Arc<MatchingEngine>,
    pub negotiation: Arc<NegotiationEngine>,
    pub trade: Arc<TradeEngine>,
    pub rooms: Arc<RoomRegistry>,
    pub capabilities: Arc<CapabilityIssuer>,
    pub config: Arc<Config>,
}
