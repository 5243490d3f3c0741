//! Process entry point: wires configuration, persistence, the matching,
//! negotiation and trade engines, the HTTP/WebSocket surface, and the
//! background sweepers, then serves until signalled to stop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use tradecore::api::state::AppState;
use tradecore::capability::CapabilityIssuer;
use tradecore::config::Config;
use tradecore::db::Db;
use tradecore::events::EventLog;
use tradecore::matching::{MatchJob, MatchQueue, MatchQueueReceivers, MatchTokenStore, MatchingEngine};
use tradecore::middleware::rate_limit::rate_limit_middleware;
use tradecore::middleware::{request_logging, RateLimitConfig, RateLimitLayer};
use tradecore::negotiation::NegotiationEngine;
use tradecore::realtime::{negotiation_ws, RealtimeState, RoomRegistry};
use tradecore::risk::RiskEvaluator;
use tradecore::trade::TradeEngine;

/// Configuration failed to load, or a secret is missing in a context that
/// requires one.
const EXIT_CONFIG_ERROR: i32 = 1;
/// Schema application against the configured database failed.
const EXIT_MIGRATION_ERROR: i32 = 2;
/// The server exited from a runtime error it could not recover from.
const EXIT_RUNTIME_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let db = match Db::open(&config.db_url) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, db_url = %config.db_url, "failed to open database / apply schema");
            std::process::exit(EXIT_MIGRATION_ERROR);
        }
    };

    if let Err(e) = run(config, db).await {
        error!(error = %e, "fatal error, shutting down");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(config: Config, db: Db) -> anyhow::Result<()> {
    let config = Arc::new(config);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;
    let capabilities = Arc::new(CapabilityIssuer::new(config.jwt_secret.clone()));
    let events = Arc::new(EventLog::new(db.clone()));
    let risk = Arc::new(RiskEvaluator::with_noop_ml());
    let tokens = Arc::new(MatchTokenStore::new(db.clone(), config.neg_default_expiry_hours));
    let (match_queue, match_queue_rx) = MatchQueue::new(
        config.match_queue_capacity_high,
        config.match_queue_capacity_medium,
        config.match_queue_capacity_low,
    );
    let match_queue = Arc::new(match_queue);
    let matching = Arc::new(MatchingEngine::new(
        db.clone(),
        events.clone(),
        risk.clone(),
        tokens.clone(),
        match_queue,
        config.max_match_radius_km,
        config.circular_lookback_days,
    ));
    let negotiation = Arc::new(NegotiationEngine::new(
        db.clone(),
        tokens.clone(),
        config.neg_default_expiry_hours,
    ));
    let trade = Arc::new(TradeEngine::new(db.clone()));
    let rooms = Arc::new(RoomRegistry::new());

    spawn_match_queue_worker(matching.clone(), match_queue_rx);

    let state = AppState {
        db: db.clone(),
        events: events.clone(),
        risk,
        tokens,
        matching,
        negotiation: negotiation.clone(),
        trade,
        rooms: rooms.clone(),
        capabilities,
        config: config.clone(),
    };

    let realtime_state = RealtimeState { rooms, db: db.clone() };

    let rate_limiter = RateLimitLayer::new(RateLimitConfig::from(config.as_ref()));

    let ws_router = Router::new()
        .route("/negotiations/:id/ws", axum::routing::get(negotiation_ws))
        .with_state(realtime_state);

    let v1 = tradecore::api::router(state).merge(ws_router);

    let app = Router::new()
        .nest("/v1", v1)
        .route("/metrics", axum::routing::get(move || async move { metrics_handle.render() }))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(axum::middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    spawn_negotiation_sweeper(negotiation, config.negotiation_sweep_interval_secs);
    spawn_idempotency_purge(db, config.idempotency_ttl_hours);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "tradecore listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tradecore shut down cleanly");
    Ok(())
}

/// Periodically flips negotiations past their `expires_at` to `EXPIRED`,
/// per the alternating-offer timeout contract.
fn spawn_negotiation_sweeper(negotiation: Arc<NegotiationEngine>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match negotiation.expire_inactive() {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "swept expired negotiations");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "negotiation expiry sweep failed"),
            }
        }
    });
}

/// Drains the MEDIUM/LOW match queue: a synchronous match whose reservation
/// exhausted its CAS retries lands here for a best-effort retry once the
/// contended availability has likely settled. MEDIUM is drained ahead of
/// LOW on every tick, per the priority contract.
fn spawn_match_queue_worker(matching: Arc<MatchingEngine>, mut receivers: MatchQueueReceivers) {
    tokio::spawn(async move {
        loop {
            let job: MatchJob = tokio::select! {
                biased;
                Some(job) = receivers.medium.recv() => job,
                Some(job) = receivers.low.recv() => job,
                else => break,
            };
            match matching.retry_job(&job) {
                Ok(outcome) if !outcome.tokens.is_empty() => {
                    info!(aggregate_type = job.aggregate_type, aggregate_id = %job.aggregate_id, tokens = outcome.tokens.len(), "retry match succeeded");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, aggregate_type = job.aggregate_type, aggregate_id = %job.aggregate_id, "retry match failed"),
            }
        }
    });
}

/// Prunes idempotency records past their TTL so the table does not grow
/// without bound.
fn spawn_idempotency_purge(db: Db, ttl_hours: i64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            match db.purge_idempotent_older_than(ttl_hours) {
                Ok(n) if n > 0 => info!(count = n, "purged expired idempotency records"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "idempotency purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining in-flight requests");
}
