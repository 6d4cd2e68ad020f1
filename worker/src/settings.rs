use std::time::Duration;

use pinghive_common::{positive_secs, GlobalConfig};

pub const API_BASE: &str = "https://api.datahive.ai/api";

pub const DEFAULT_PING_INTERVAL_SECS: f64 = 60.0;
pub const INFO_CHECK_INTERVAL_SECS: u64 = 300;
pub const JITTER_MAX_SECS: f64 = 2.0;
pub const MIN_SLEEP_SECS: f64 = 0.5;
pub const INITIAL_BACKOFF_SECS: f64 = 5.0;
pub const BACKOFF_FACTOR: f64 = 1.5;
pub const MAX_BACKOFF_SECS: f64 = 60.0;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Parámetros de tiempo de un worker. Se pasan al construirlo;
/// no hay globales mutables.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub default_interval: Duration,
    /// Override por corrida (`--ping-interval`), gana sobre la config remota.
    pub interval_override: Option<Duration>,
    pub info_refresh: Duration,
    pub jitter_max: Duration,
    pub min_sleep: Duration,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs_f64(DEFAULT_PING_INTERVAL_SECS),
            interval_override: None,
            info_refresh: Duration::from_secs(INFO_CHECK_INTERVAL_SECS),
            jitter_max: Duration::from_secs_f64(JITTER_MAX_SECS),
            min_sleep: Duration::from_secs_f64(MIN_SLEEP_SECS),
            initial_backoff: Duration::from_secs_f64(INITIAL_BACKOFF_SECS),
            backoff_factor: BACKOFF_FACTOR,
            max_backoff: Duration::from_secs_f64(MAX_BACKOFF_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl WorkerSettings {
    /// Acepta el override en segundos; valores no positivos o que no
    /// entran en un `Duration` se ignoran.
    pub fn with_interval_override(mut self, secs: Option<f64>) -> Self {
        self.interval_override = secs.and_then(positive_secs);
        self
    }

    /// Intervalo entre pings: override > config remota > default.
    pub fn resolve_interval(&self, config: &GlobalConfig) -> Duration {
        if let Some(d) = self.interval_override {
            return d;
        }
        config
            .job_execution_delay
            .and_then(positive_secs)
            .unwrap_or(self.default_interval)
    }
}
