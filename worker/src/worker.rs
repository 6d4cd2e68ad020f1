use std::{sync::Arc, time::Duration};

use pinghive_common::{
    device_id_for, mask_token, EventAction, EventLog, EventOutcome, EventRow, GlobalConfig,
    ProxySpec, WorkerName, WorkerStats, WorkerStatus,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{
    sync::watch,
    task::{self, JoinHandle},
    time::{sleep, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    api::{AccountApi, PingReply},
    backoff::Backoff,
    error::{truncate, ApiError},
    settings::WorkerSettings,
};

/// Identidad fija de un worker.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub name: WorkerName,
    pub token: String,
    pub device_id: String,
    pub proxy: Option<ProxySpec>,
}

impl WorkerIdentity {
    pub fn new(name: impl Into<String>, token: &str, proxy: Option<ProxySpec>) -> Self {
        let token = token.trim().to_string();
        Self {
            name: name.into(),
            device_id: device_id_for(&token),
            token,
            proxy,
        }
    }
}

/// Una cuenta: login, luego heartbeats hasta que se le pida parar o el
/// token deje de ser válido.
///
/// Las estadísticas viven en un canal `watch`: el worker es el único que
/// tiene el `Sender`, el supervisor sólo lee copias.
pub struct AccountWorker<A> {
    identity: WorkerIdentity,
    api: A,
    settings: WorkerSettings,
    config: Arc<GlobalConfig>,
    events: Arc<EventLog>,
    rng: StdRng,
    stats: watch::Sender<WorkerStats>,
}

impl<A: AccountApi> AccountWorker<A> {
    pub fn new(
        identity: WorkerIdentity,
        api: A,
        settings: WorkerSettings,
        config: Arc<GlobalConfig>,
        events: Arc<EventLog>,
    ) -> Self {
        let (stats, _) = watch::channel(WorkerStats::new());
        Self {
            identity,
            api,
            settings,
            config,
            events,
            rng: StdRng::from_entropy(),
            stats,
        }
    }

    /// Fija la semilla del jitter (tests).
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Lanza el loop en su propia tarea y devuelve el handle de control.
    pub fn start(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = self.stats.subscribe();
        let name = self.identity.name.clone();

        if let Some(p) = &self.identity.proxy {
            debug!("[{}] usando proxy {}", name, p.display());
        }

        let task = tokio::spawn(self.run(stop_rx));
        WorkerHandle {
            name,
            stop: stop_tx,
            stats,
            task,
            joined: false,
        }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        if !self.login().await {
            return;
        }

        let interval = self.settings.resolve_interval(&self.config);
        debug!(
            "[{}] intervalo de ping {:.1}s",
            self.identity.name,
            interval.as_secs_f64()
        );

        let mut backoff = Backoff::new(
            self.settings.initial_backoff,
            self.settings.max_backoff,
            self.settings.backoff_factor,
        );
        let mut last_info = Instant::now();

        loop {
            if *stop.borrow() {
                break;
            }

            match self.api.ping().await {
                Ok(reply) => {
                    self.on_ping_ok(&reply).await;
                    backoff.reset();
                }
                Err(err) => {
                    if self.on_ping_fail(&err).await {
                        break;
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        "[{}] backoff {:.1}s",
                        self.identity.name,
                        delay.as_secs_f64()
                    );
                    if !pause(&mut stop, delay).await {
                        break;
                    }
                    // tras un fallo no se duerme el intervalo, se reintenta ya
                    continue;
                }
            }

            if last_info.elapsed() >= self.settings.info_refresh {
                self.refresh_info().await;
                last_info = Instant::now();
            }

            let delay = self.next_sleep(interval);
            if !pause(&mut stop, delay).await {
                break;
            }
        }

        info!("[{}] worker detenido", self.identity.name);
    }

    /// Devuelve `false` si el worker no debe entrar al loop (token inválido).
    async fn login(&mut self) -> bool {
        let name = self.identity.name.clone();

        match self.api.fetch_user().await {
            Ok(user) => {
                self.stats.send_modify(|s| {
                    if let Some(p) = user.points {
                        s.points = p;
                    }
                    s.status = WorkerStatus::Active;
                });
                let points = self.stats.borrow().points;
                info!(
                    "[{}] login ok | email: {} | points: {}",
                    name,
                    user.email.as_deref().unwrap_or("N/A"),
                    points
                );
                self.record(EventAction::Login, EventOutcome::Ok, Some(200), "")
                    .await;
                true
            }
            Err(err) => {
                let status = err.status();
                self.stats.send_modify(|s| s.status = status);
                warn!(
                    "[{}] login falló ({}) | token: {}",
                    name,
                    status,
                    mask_token(&self.identity.token)
                );
                self.record(
                    EventAction::Login,
                    EventOutcome::Fail,
                    err.http_status(),
                    err.to_string(),
                )
                .await;

                if err.is_fatal() {
                    error!("[{}] token inválido, deteniendo worker", name);
                    return false;
                }
                // la API puede estar caída sólo en el login: seguimos igual
                true
            }
        }
    }

    async fn on_ping_ok(&mut self, reply: &PingReply) {
        self.stats.send_modify(|s| {
            s.record_success();
            if let Some(p) = reply.points() {
                s.points = p;
            }
        });

        let (total, points) = {
            let s = self.stats.borrow();
            (s.total, s.points)
        };
        let snippet = reply.snippet(200);
        info!(
            "[{}] ping ok | #{} pts:{} {}",
            self.identity.name, total, points, snippet
        );
        self.record(EventAction::Ping, EventOutcome::Ok, Some(200), snippet)
            .await;
    }

    /// Registra el fallo. Devuelve `true` si es fatal.
    async fn on_ping_fail(&mut self, err: &ApiError) -> bool {
        let status = err.status();
        self.stats.send_modify(|s| s.record_failure(status));

        let (total, consecutive) = {
            let s = self.stats.borrow();
            (s.total, s.consecutive_fails)
        };
        warn!(
            "[{}] ping fail ({}) | #{} fails:{}",
            self.identity.name, status, total, consecutive
        );

        let message = match err {
            ApiError::UnexpectedStatus { status, body } if !body.is_empty() => {
                warn!("[{}]   -> HTTP {}: {}", self.identity.name, status, body);
                truncate(body, 200)
            }
            _ => status.to_string(),
        };
        self.record(
            EventAction::Ping,
            EventOutcome::Fail,
            err.http_status(),
            message,
        )
        .await;

        if err.is_fatal() {
            error!("[{}] token inválido, deteniendo", self.identity.name);
        }
        err.is_fatal()
    }

    /// Refresco periódico del perfil. Si falla no pasa nada: se intenta
    /// en el próximo umbral.
    async fn refresh_info(&mut self) {
        match self.api.fetch_user().await {
            Ok(user) => {
                if let Some(p) = user.points {
                    self.stats.send_modify(|s| s.points = p);
                }
                let points = self.stats.borrow().points;
                info!("[{}] points: {}", self.identity.name, points);
                self.record(EventAction::Info, EventOutcome::Ok, Some(200), "")
                    .await;
            }
            Err(err) => {
                debug!("[{}] refresh de /user falló: {}", self.identity.name, err);
            }
        }
    }

    /// Intervalo +- jitter, nunca por debajo del mínimo.
    fn next_sleep(&mut self, interval: Duration) -> Duration {
        let jitter = self.settings.jitter_max.as_secs_f64();
        let offset = if jitter > 0.0 {
            self.rng.gen_range(-jitter..=jitter)
        } else {
            0.0
        };
        let secs = (interval.as_secs_f64() + offset).max(self.settings.min_sleep.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(interval)
    }

    /// Escribe la fila en el CSV fuera de los hilos del runtime.
    async fn record(
        &self,
        action: EventAction,
        outcome: EventOutcome,
        http_code: Option<u16>,
        message: impl Into<String>,
    ) {
        if self.events.path().is_none() {
            return;
        }
        let row = EventRow::now(
            &self.identity.name,
            action,
            outcome,
            http_code,
            self.stats.borrow().points,
            message,
        );
        let events = Arc::clone(&self.events);
        match task::spawn_blocking(move || events.append(&row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("[{}] no se pudo escribir el log: {:?}", self.identity.name, e),
            Err(e) => debug!("[{}] escritura del log abortada: {}", self.identity.name, e),
        }
    }
}

/// Duerme `delay` salvo que llegue la señal de stop.
/// Devuelve `false` si hay que cortar el loop.
async fn pause(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *stop.borrow() {
        return false;
    }
    tokio::select! {
        _ = sleep(delay) => true,
        changed = stop.changed() => match changed {
            Ok(()) => {
                let stopped = *stop.borrow();
                !stopped
            }
            // si se soltó el handle nadie puede pararlo: cortamos
            Err(_) => false,
        },
    }
}

/// Control de un worker en ejecución.
#[derive(Debug)]
pub struct WorkerHandle {
    name: WorkerName,
    stop: watch::Sender<bool>,
    stats: watch::Receiver<WorkerStats>,
    task: JoinHandle<()>,
    joined: bool,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pide que el worker termine en el próximo punto de control.
    /// Un request en vuelo se deja terminar.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn snapshot_stats(&self) -> WorkerStats {
        self.stats.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Espera a que la tarea termine.
    pub async fn stopped(&mut self) {
        if self.joined {
            return;
        }
        let res = (&mut self.task).await;
        self.joined = true;
        if let Err(e) = res {
            if !e.is_cancelled() {
                warn!("[{}] la tarea del worker terminó con error: {:?}", self.name, e);
            }
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UserProfile;
    use serde_json::json;
    use std::{collections::VecDeque, sync::Mutex};

    #[derive(Default)]
    struct Script {
        users: VecDeque<Result<UserProfile, ApiError>>,
        pings: VecDeque<Result<PingReply, ApiError>>,
        ping_times: Vec<Instant>,
        user_calls: usize,
    }

    /// API en memoria: devuelve lo guionado y después todo ok.
    #[derive(Clone, Default)]
    struct ScriptedApi(Arc<Mutex<Script>>);

    impl ScriptedApi {
        fn with_user(self, r: Result<UserProfile, ApiError>) -> Self {
            self.0.lock().unwrap().users.push_back(r);
            self
        }

        fn with_pings(self, rs: Vec<Result<PingReply, ApiError>>) -> Self {
            self.0.lock().unwrap().pings.extend(rs);
            self
        }

        fn ping_times(&self) -> Vec<Instant> {
            self.0.lock().unwrap().ping_times.clone()
        }

        fn user_calls(&self) -> usize {
            self.0.lock().unwrap().user_calls
        }
    }

    impl AccountApi for ScriptedApi {
        async fn fetch_user(&self) -> Result<UserProfile, ApiError> {
            let mut s = self.0.lock().unwrap();
            s.user_calls += 1;
            s.users.pop_front().unwrap_or_else(|| {
                Ok(UserProfile {
                    points: Some(0),
                    email: None,
                })
            })
        }

        async fn ping(&self) -> Result<PingReply, ApiError> {
            let mut s = self.0.lock().unwrap();
            s.ping_times.push(Instant::now());
            s.pings
                .pop_front()
                .unwrap_or_else(|| Ok(PingReply::from_text("{}")))
        }
    }

    fn profile(points: i64) -> Result<UserProfile, ApiError> {
        Ok(UserProfile {
            points: Some(points),
            email: Some("x@y.z".into()),
        })
    }

    fn settings(interval_secs: f64) -> WorkerSettings {
        let mut s = WorkerSettings::default().with_interval_override(Some(interval_secs));
        s.jitter_max = Duration::ZERO;
        s
    }

    fn worker(api: ScriptedApi, settings: WorkerSettings) -> AccountWorker<ScriptedApi> {
        AccountWorker::new(
            WorkerIdentity::new("Account-1", "tok-123456789", None),
            api,
            settings,
            Arc::new(GlobalConfig::default()),
            Arc::new(EventLog::disabled()),
        )
        .with_rng_seed(9)
    }

    fn gaps(times: &[Instant]) -> Vec<f64> {
        times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs_f64())
            .collect()
    }

    fn assert_close(got: &[f64], expected: &[f64]) {
        assert_eq!(got.len(), expected.len(), "{got:?} vs {expected:?}");
        for (g, e) in got.iter().zip(expected) {
            assert!((g - e).abs() < 0.01, "{got:?} vs {expected:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn login_rechazado_no_entra_al_loop() {
        let api = ScriptedApi::default().with_user(Err(ApiError::AuthRejected { status: 403 }));
        let mut handle = worker(api.clone(), settings(60.0)).start();

        handle.stopped().await;

        assert!(!handle.is_running());
        assert!(api.ping_times().is_empty());
        let stats = handle.snapshot_stats();
        assert_eq!(stats.status, WorkerStatus::InvalidToken);
        assert_eq!(stats.total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn login_con_error_transitorio_igual_entra_al_loop() {
        let api = ScriptedApi::default().with_user(Err(ApiError::Timeout));
        let mut handle = worker(api.clone(), settings(60.0)).start();

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(handle.is_running());
        assert_eq!(api.ping_times().len(), 1);
        let stats = handle.snapshot_stats();
        assert_eq!(stats.status, WorkerStatus::Active);
        assert_eq!(stats.ok, 1);

        handle.request_stop();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn intervalo_remoto_fuera_de_rango_no_tumba_al_worker() {
        let api = ScriptedApi::default().with_user(profile(1));
        let mut s = WorkerSettings::default();
        s.jitter_max = Duration::ZERO;
        let cfg = GlobalConfig {
            job_execution_delay: Some(1e20),
            min_extension_version: None,
        };
        let mut handle = AccountWorker::new(
            WorkerIdentity::new("Account-1", "tok-123456789", None),
            api.clone(),
            s,
            Arc::new(cfg),
            Arc::new(EventLog::disabled()),
        )
        .start();

        tokio::time::sleep(Duration::from_secs(125)).await;

        assert!(handle.is_running());
        assert_close(&gaps(&api.ping_times()), &[60.0, 60.0]);

        handle.request_stop();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_crece_y_se_resetea_tras_exito() {
        let api = ScriptedApi::default().with_user(profile(5)).with_pings(vec![
            Err(ApiError::Transport("conexión reseteada".into())),
            Err(ApiError::Timeout),
            Err(ApiError::ProxyFailure("proxy caído".into())),
            Ok(PingReply::from_text("{}")),
            Err(ApiError::UnexpectedStatus {
                status: 429,
                body: "slow down".into(),
            }),
            Ok(PingReply::from_text("{}")),
        ]);
        let mut handle = worker(api.clone(), settings(60.0)).start();

        // 5 + 7.5 + 11.25 + 60 + 5 = 88.75s hasta el sexto ping
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.request_stop();
        handle.stopped().await;

        let times = api.ping_times();
        assert_close(&gaps(&times[..6]), &[5.0, 7.5, 11.25, 60.0, 5.0]);

        let stats = handle.snapshot_stats();
        assert_eq!(stats.ok + stats.fail, stats.total);
        assert_eq!(stats.fail, 4);
        assert_eq!(stats.consecutive_fails, 0);
        assert_eq!(stats.status, WorkerStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_respeta_el_tope() {
        let fails = (0..10).map(|_| Err(ApiError::Timeout)).collect();
        let api = ScriptedApi::default().with_pings(fails);
        let mut handle = worker(api.clone(), settings(60.0)).start();

        // el décimo fallo llega en t~280.9s; a los 300s sigue esperando
        tokio::time::sleep(Duration::from_secs(300)).await;
        handle.request_stop();
        handle.stopped().await;

        let g = gaps(&api.ping_times());
        assert_eq!(g.len(), 9);
        assert_close(
            &g[..9],
            &[5.0, 7.5, 11.25, 16.875, 25.3125, 37.96875, 56.953125, 60.0, 60.0],
        );
        assert_eq!(handle.snapshot_stats().consecutive_fails, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_401_detiene_el_worker() {
        let api = ScriptedApi::default().with_user(profile(1)).with_pings(vec![
            Ok(PingReply::from_text("{}")),
            Err(ApiError::AuthRejected { status: 401 }),
        ]);
        let mut handle = worker(api.clone(), settings(10.0)).start();

        tokio::time::sleep(Duration::from_secs(300)).await;
        handle.stopped().await;

        assert!(!handle.is_running());
        assert_eq!(api.ping_times().len(), 2);
        let stats = handle.snapshot_stats();
        assert_eq!(stats.status, WorkerStatus::InvalidToken);
        assert_eq!((stats.total, stats.ok, stats.fail), (2, 1, 1));
        assert_eq!(stats.consecutive_fails, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn puntos_del_ping_y_respuesta_rota_los_conserva() {
        let api = ScriptedApi::default().with_user(profile(10)).with_pings(vec![
            Ok(PingReply::from_text(json!({"points": 15}).to_string())),
            Ok(PingReply::from_text("no es json")),
        ]);
        let mut handle = worker(api.clone(), settings(5.0)).start();

        tokio::time::sleep(Duration::from_secs(6)).await;
        handle.request_stop();
        handle.stopped().await;

        let stats = handle.snapshot_stats();
        assert_eq!(stats.ok, 2);
        assert_eq!(stats.points, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn refresca_perfil_cada_300s() {
        let api = ScriptedApi::default()
            .with_user(profile(10))
            .with_user(Err(ApiError::Timeout))
            .with_user(profile(99));
        let mut handle = worker(api.clone(), settings(100.0)).start();

        // pings en t=0,100,200,300 (refresh falla), 400, ..., 600 (refresh ok)
        tokio::time::sleep(Duration::from_secs(350)).await;
        assert_eq!(api.user_calls(), 2);
        assert_eq!(handle.snapshot_stats().points, 10);
        assert_eq!(handle.snapshot_stats().status, WorkerStatus::Active);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(api.user_calls(), 3);
        assert_eq!(handle.snapshot_stats().points, 99);

        handle.request_stop();
        handle.stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_corta_la_espera() {
        let api = ScriptedApi::default();
        let mut handle = worker(api.clone(), settings(3600.0)).start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        handle.request_stop();
        handle.stopped().await;

        assert!(before.elapsed() < Duration::from_secs(1));
        assert_eq!(api.ping_times().len(), 1);
        assert!(!handle.is_running());
    }

    #[test]
    fn jitter_queda_dentro_del_rango_y_respeta_el_minimo() {
        let mut s = WorkerSettings::default();
        s.jitter_max = Duration::from_secs(2);
        let mut w = worker(ScriptedApi::default(), s);

        for _ in 0..200 {
            let d = w.next_sleep(Duration::from_secs(60)).as_secs_f64();
            assert!((58.0..=62.0).contains(&d), "{d}");
        }
        for _ in 0..50 {
            let d = w.next_sleep(Duration::from_millis(100));
            assert!(d >= Duration::from_millis(500));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn escribe_eventos_en_el_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let api = ScriptedApi::default()
            .with_user(profile(7))
            .with_pings(vec![Err(ApiError::UnexpectedStatus {
                status: 500,
                body: "boom".into(),
            })]);
        let w = AccountWorker::new(
            WorkerIdentity::new("Account-3", "tok", None),
            api,
            settings(60.0),
            Arc::new(GlobalConfig::default()),
            Arc::new(EventLog::new(Some(path.clone()))),
        );
        let mut handle = w.start();

        tokio::time::sleep(Duration::from_secs(6)).await;
        handle.request_stop();
        handle.stopped().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "timestamp,account,action,status,http_code,points,message");
        assert!(lines[1].ends_with(",Account-3,login,ok,200,7,"));
        assert!(lines[2].ends_with(",Account-3,ping,fail,500,7,boom"));
        assert!(lines[3].ends_with(",Account-3,ping,ok,200,7,{}"));
    }
}
