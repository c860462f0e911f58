use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::ProcessorError;

/// Process configuration, loaded from the environment with an optional
/// `.env` fallback. All fields are defaulted; an explicitly-set value that
/// fails to parse is a `ProcessorError::Config`, surfaced at startup only.
#[derive(Debug, Clone)]
pub struct Config {
    pub window_size_seconds: u64,
    pub latency_p99_threshold_ms: f64,
    pub error_rate_threshold: f64,
    pub traffic_drop_threshold: f64,
    pub consecutive_windows_for_alert: u32,
    pub alert_cooldown_seconds: u64,
    pub detection_interval_messages: u64,
    pub poll_timeout_ms: u64,
    pub shutdown_flush_timeout_ms: u64,
    pub ingest_topic: String,
    pub alerts_topic: String,
    pub consumer_group: String,
    pub metrics_bind_addr: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size_seconds: 60,
            latency_p99_threshold_ms: 500.0,
            error_rate_threshold: 0.05,
            traffic_drop_threshold: 0.5,
            consecutive_windows_for_alert: 3,
            alert_cooldown_seconds: 300,
            detection_interval_messages: 10,
            poll_timeout_ms: 1000,
            shutdown_flush_timeout_ms: 10_000,
            ingest_topic: "metrics.raw".to_string(),
            alerts_topic: "alerts.fired".to_string(),
            consumer_group: "stream-processor-group".to_string(),
            metrics_bind_addr: "0.0.0.0:9090".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the environment, applying a best-effort
    /// `.env` fallback first. A present-but-unparseable value aborts with
    /// `ProcessorError::Config`; an absent one falls back to the default.
    pub fn from_env() -> Result<Self, ProcessorError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            window_size_seconds: parse_env("WINDOW_SIZE_SECONDS", defaults.window_size_seconds)?,
            latency_p99_threshold_ms: parse_env(
                "LATENCY_P99_THRESHOLD_MS",
                defaults.latency_p99_threshold_ms,
            )?,
            error_rate_threshold: parse_env(
                "ERROR_RATE_THRESHOLD",
                defaults.error_rate_threshold,
            )?,
            traffic_drop_threshold: parse_env(
                "TRAFFIC_DROP_THRESHOLD",
                defaults.traffic_drop_threshold,
            )?,
            consecutive_windows_for_alert: parse_env(
                "CONSECUTIVE_WINDOWS_FOR_ALERT",
                defaults.consecutive_windows_for_alert,
            )?,
            alert_cooldown_seconds: parse_env(
                "ALERT_COOLDOWN_SECONDS",
                defaults.alert_cooldown_seconds,
            )?,
            detection_interval_messages: parse_env(
                "DETECTION_INTERVAL_MESSAGES",
                defaults.detection_interval_messages,
            )?,
            poll_timeout_ms: parse_env("POLL_TIMEOUT_MS", defaults.poll_timeout_ms)?,
            shutdown_flush_timeout_ms: parse_env(
                "SHUTDOWN_FLUSH_TIMEOUT_MS",
                defaults.shutdown_flush_timeout_ms,
            )?,
            ingest_topic: env::var("INGEST_TOPIC").unwrap_or(defaults.ingest_topic),
            alerts_topic: env::var("ALERTS_TOPIC").unwrap_or(defaults.alerts_topic),
            consumer_group: env::var("CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            metrics_bind_addr: parse_metrics_bind_addr(&defaults.metrics_bind_addr)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ProcessorError> {
    match env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ProcessorError::Config {
            field: name.to_string(),
            reason: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

/// `metrics_bind_addr` is only ever consumed by the external scrape-endpoint
/// collaborator, but a malformed value is still validated here (parsed as a
/// `SocketAddr`) so it fails fast at this process's startup rather than
/// surfacing as a confusing bind error in the collaborator later.
fn parse_metrics_bind_addr(default: &str) -> Result<String, ProcessorError> {
    match env::var("METRICS_BIND_ADDR") {
        Ok(raw) => raw
            .parse::<SocketAddr>()
            .map(|addr| addr.to_string())
            .map_err(|_| ProcessorError::Config {
                field: "METRICS_BIND_ADDR".to_string(),
                reason: format!("could not parse {raw:?} as a socket address"),
            }),
        Err(_) => Ok(default.to_string()),
    }
}
