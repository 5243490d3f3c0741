//! Runtime configuration
//! Mission: load every knob from the environment, with conservative defaults.

use std::env;

/// Where secrets come from. The env-backed implementation is the local-dev
/// fallback; a real deployment wires a secret-manager-backed implementation
/// behind the same trait without touching call sites.
pub trait SecretSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub signing_secret: String,
    pub jwt_secret: String,
    pub db_url: String,
    pub cache_url: String,
    pub model_dir: Option<String>,
    pub max_match_radius_km: f64,
    pub neg_default_expiry_hours: i64,
    pub reservation_hold_hours: i64,
    pub server_port: u16,
    pub match_queue_capacity_high: usize,
    pub match_queue_capacity_medium: usize,
    pub match_queue_capacity_low: usize,
    pub negotiation_sweep_interval_secs: u64,
    pub circular_lookback_days: i64,
    pub idempotency_ttl_hours: i64,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let secrets = EnvSecretSource;

        let signing_secret = secrets
            .get("SIGNING_SECRET")
            .unwrap_or_else(|| "dev-signing-secret-change-me".to_string());
        let jwt_secret = secrets
            .get("JWT_SECRET")
            .unwrap_or_else(|| "dev-jwt-secret-change-me".to_string());

        let db_url = env::var("DB_URL").unwrap_or_else(|_| "./tradecore.db".to_string());
        let cache_url = env::var("CACHE_URL").unwrap_or_else(|_| "memory://local".to_string());
        let model_dir = env::var("MODEL_DIR").ok();

        let max_match_radius_km = env::var("MAX_MATCH_RADIUS_KM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500.0);

        let neg_default_expiry_hours = env::var("NEG_DEFAULT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(48);

        let reservation_hold_hours = env::var("RESERVATION_HOLD_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let match_queue_capacity_high = env::var("MATCH_QUEUE_CAPACITY_HIGH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);
        let match_queue_capacity_medium = env::var("MATCH_QUEUE_CAPACITY_MEDIUM")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(512);
        let match_queue_capacity_low = env::var("MATCH_QUEUE_CAPACITY_LOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1024);

        let negotiation_sweep_interval_secs = env::var("NEGOTIATION_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let circular_lookback_days = env::var("CIRCULAR_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let idempotency_ttl_hours = env::var("IDEMPOTENCY_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);

        let rate_limit_max_requests = env::var("RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);
        let rate_limit_window_secs = env::var("RATE_LIMIT_WINDOW_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let rate_limit_burst = env::var("RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        Ok(Self {
            signing_secret,
            jwt_secret,
            db_url,
            cache_url,
            model_dir,
            max_match_radius_km,
            neg_default_expiry_hours,
            reservation_hold_hours,
            server_port,
            match_queue_capacity_high,
            match_queue_capacity_medium,
            match_queue_capacity_low,
            negotiation_sweep_interval_secs,
            circular_lookback_days,
            idempotency_ttl_hours,
            rate_limit_max_requests,
            rate_limit_window_secs,
            rate_limit_burst,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_env() {
        // Config::from_env reads whatever the process env happens to carry;
        // we only assert the shape holds together, not specific values.
        let cfg = Config {
            signing_secret: "x".into(),
            jwt_secret: "y".into(),
            db_url: "./t.db".into(),
            cache_url: "memory://local".into(),
            model_dir: None,
            max_match_radius_km: 500.0,
            neg_default_expiry_hours: 48,
            reservation_hold_hours: 24,
            server_port: 8080,
            match_queue_capacity_high: 256,
            match_queue_capacity_medium: 512,
            match_queue_capacity_low: 1024,
            negotiation_sweep_interval_secs: 60,
            circular_lookback_days: 30,
            idempotency_ttl_hours: 24,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 60,
            rate_limit_burst: 20,
        };
        assert_eq!(cfg.neg_default_expiry_hours, 48);
    }
}
