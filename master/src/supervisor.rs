use std::{sync::Arc, time::Duration};

use pinghive_common::{EventLog, Fingerprint, GlobalConfig, ProxySpec, WorkerStats};
use pinghive_worker::{
    AccountApi, AccountWorker, ApiError, HttpApi, WorkerHandle, WorkerIdentity, WorkerSettings,
};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Pausa entre arranques para no pegarle a la API con todos juntos.
pub const STARTUP_STAGGER: Duration = Duration::from_millis(300);
/// Cuánto se espera a que los workers terminen al apagar.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub fn account_name(index: usize) -> String {
    format!("Account-{}", index + 1)
}

/// Reparto round-robin: el worker `i` usa `proxies[i % n]`.
/// Si hay más proxies que cuentas, los que sobran no se usan.
pub fn assign_proxy(index: usize, proxies: &[ProxySpec]) -> Option<ProxySpec> {
    if proxies.is_empty() {
        None
    } else {
        Some(proxies[index % proxies.len()].clone())
    }
}

/// Arma el worker real de la cuenta `index`: fingerprint propio,
/// cliente HTTP propio y su proxy.
pub fn build_http_worker(
    index: usize,
    token: &str,
    proxies: &[ProxySpec],
    api_base: &str,
    settings: &WorkerSettings,
    config: Arc<GlobalConfig>,
    events: Arc<EventLog>,
) -> Result<AccountWorker<HttpApi>, ApiError> {
    let identity = WorkerIdentity::new(account_name(index), token, assign_proxy(index, proxies));

    let fingerprint = Fingerprint::generate(&mut rand::thread_rng(), config.extension_version());
    let headers = fingerprint.headers(&identity.token, &identity.device_id);
    let api = HttpApi::new(
        api_base,
        &headers,
        identity.proxy.as_ref(),
        settings.request_timeout,
    )?;

    Ok(AccountWorker::new(
        identity,
        api,
        settings.clone(),
        config,
        events,
    ))
}

/// Lo que el reporte muestra de cada worker.
#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub name: String,
    pub running: bool,
    pub stats: WorkerStats,
}

/// Dueño de los handles de todos los workers.
pub struct Supervisor {
    workers: Vec<WorkerHandle>,
    stagger: Duration,
    drain_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(STARTUP_STAGGER, DRAIN_TIMEOUT)
    }
}

impl Supervisor {
    pub fn new(stagger: Duration, drain_timeout: Duration) -> Self {
        Self {
            workers: Vec::new(),
            stagger,
            drain_timeout,
        }
    }

    /// Arranca un worker; a partir del segundo espera `stagger` antes.
    pub async fn start<A: AccountApi>(&mut self, worker: AccountWorker<A>) {
        if !self.workers.is_empty() && !self.stagger.is_zero() {
            sleep(self.stagger).await;
        }
        self.workers.push(worker.start());
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_running()).count()
    }

    /// Copia de las estadísticas de cada worker, en orden de arranque.
    pub fn snapshot(&self) -> Vec<WorkerSummary> {
        self.workers
            .iter()
            .map(|w| WorkerSummary {
                name: w.name().to_string(),
                running: w.is_running(),
                stats: w.snapshot_stats(),
            })
            .collect()
    }

    /// Pide stop a todos y espera un rato a que terminen.
    /// Los que no terminan a tiempo se abortan.
    pub async fn shutdown(&mut self) {
        for w in &self.workers {
            w.request_stop();
        }

        let workers = &mut self.workers;
        let drain = async move {
            for w in workers.iter_mut() {
                w.stopped().await;
            }
        };

        if timeout(self.drain_timeout, drain).await.is_err() {
            for w in &self.workers {
                if w.is_running() {
                    warn!("[{}] no terminó a tiempo, abortando", w.name());
                    w.abort();
                }
            }
        }

        info!(
            "{} worker(s) detenidos",
            self.workers.len() - self.running_count()
        );
    }
}
