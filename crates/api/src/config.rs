//! Environment-driven configuration.

use std::time::Duration;

use vendia_billing::Establishment;
use vendia_infra::jobs::RetryPolicy;

/// Everything the server reads from the environment, with dev defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address, `LISTEN_ADDR` (default `0.0.0.0:8080`).
    pub listen_addr: String,
    /// `USE_PERSISTENT_STORES=1` selects Postgres; anything else keeps the
    /// in-memory backends.
    pub use_persistent_stores: bool,
    /// `DATABASE_URL`; required when persistent stores are on.
    pub database_url: Option<String>,
    /// Tax authority base URL, `SRI_ENDPOINT`. Unset means the in-process
    /// mock authority (dev only).
    pub sri_endpoint: Option<String>,
    /// Per-request authority timeout, `SRI_TIMEOUT_SECS` (default 10).
    pub sri_timeout: Duration,
    /// Submission/poll retry budget, `SRI_MAX_ATTEMPTS` (default 3).
    pub retry: RetryPolicy,
    /// Worker queue poll interval, `WORKER_POLL_SECS` (default 1).
    pub worker_poll: Duration,
    /// Sweep timer period, `SWEEP_INTERVAL_SECS` (default 60).
    pub sweep_interval: Duration,
    /// Age before a PROCESSING sale counts as stuck, `SWEEP_THRESHOLD_SECS`
    /// (default 300).
    pub sweep_threshold: Duration,
    /// Default webhook for invoice results, `WEBHOOK_URL` (optional).
    pub webhook_url: Option<String>,
    pub establishment: Establishment,
}

impl Config {
    pub fn from_env() -> Self {
        let use_persistent_stores = env_flag("USE_PERSISTENT_STORES");
        let database_url = std::env::var("DATABASE_URL").ok();
        if use_persistent_stores && database_url.is_none() {
            tracing::warn!("USE_PERSISTENT_STORES set without DATABASE_URL; falling back to in-memory stores");
        }

        let sri_endpoint = std::env::var("SRI_ENDPOINT").ok();
        if sri_endpoint.is_none() {
            tracing::warn!("SRI_ENDPOINT not set; using the in-process mock authority (dev only)");
        }

        let max_attempts = env_u64("SRI_MAX_ATTEMPTS", 3).clamp(1, 20) as u32;

        Self {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            use_persistent_stores,
            database_url,
            sri_endpoint,
            sri_timeout: Duration::from_secs(env_u64("SRI_TIMEOUT_SECS", 10)),
            retry: RetryPolicy::new(
                max_attempts,
                Duration::from_secs(2),
                Duration::from_secs(60),
            ),
            worker_poll: Duration::from_secs(env_u64("WORKER_POLL_SECS", 1)),
            sweep_interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 60)),
            sweep_threshold: Duration::from_secs(env_u64("SWEEP_THRESHOLD_SECS", 300)),
            webhook_url: std::env::var("WEBHOOK_URL").ok(),
            establishment: establishment_from_env(),
        }
    }
}

fn establishment_from_env() -> Establishment {
    let ruc = std::env::var("ESTABLISHMENT_RUC").unwrap_or_else(|_| {
        tracing::warn!("ESTABLISHMENT_RUC not set; using dev placeholder");
        "9999999999001".to_string()
    });
    Establishment {
        company_name: std::env::var("ESTABLISHMENT_NAME")
            .unwrap_or_else(|_| "Dev Store".to_string()),
        ruc,
        address: std::env::var("ESTABLISHMENT_ADDRESS").unwrap_or_else(|_| "N/A".to_string()),
        establishment_code: std::env::var("ESTABLISHMENT_CODE")
            .unwrap_or_else(|_| "001".to_string()),
        emission_point: std::env::var("EMISSION_POINT").unwrap_or_else(|_| "001".to_string()),
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "not a number, using default");
            default
        }),
        Err(_) => default,
    }
}
