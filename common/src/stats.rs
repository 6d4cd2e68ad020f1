use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Estado de un worker tal como lo ve el supervisor.
///
/// `ProxyError`, `Timeout` y `Error` son estados "degradados": el worker
/// sigue vivo y vuelve a `Active` con el siguiente heartbeat exitoso.
/// `InvalidToken` es terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Initializing,
    Active,
    InvalidToken,
    ProxyError,
    Timeout,
    Error,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Initializing => "initializing",
            WorkerStatus::Active => "active",
            WorkerStatus::InvalidToken => "invalid_token",
            WorkerStatus::ProxyError => "proxy_error",
            WorkerStatus::Timeout => "timeout",
            WorkerStatus::Error => "error",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            WorkerStatus::ProxyError | WorkerStatus::Timeout | WorkerStatus::Error
        )
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contadores de un worker. Sólo el worker dueño los modifica;
/// el supervisor trabaja siempre con copias (snapshots).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub total: u64,
    pub ok: u64,
    pub fail: u64,
    pub consecutive_fails: u32,
    pub points: i64,
    pub status: WorkerStatus,
    pub start: DateTime<Utc>,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStats {
    pub fn new() -> Self {
        Self {
            total: 0,
            ok: 0,
            fail: 0,
            consecutive_fails: 0,
            points: 0,
            status: WorkerStatus::Initializing,
            start: Utc::now(),
        }
    }

    /// Heartbeat exitoso: suma total/ok y resetea la racha de fallos.
    pub fn record_success(&mut self) {
        self.total += 1;
        self.ok += 1;
        self.consecutive_fails = 0;
        self.status = WorkerStatus::Active;
    }

    /// Heartbeat fallido (de cualquier tipo).
    pub fn record_failure(&mut self, status: WorkerStatus) {
        self.total += 1;
        self.fail += 1;
        self.consecutive_fails += 1;
        self.status = status;
    }

    /// Porcentaje de heartbeats ok (0 si todavía no hubo ninguno).
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.ok as f64 / self.total as f64) * 100.0
    }

    pub fn uptime_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start).num_seconds().max(0) as u64
    }
}
