mod cli;
mod monitor;
mod supervisor;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use std::{process, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pinghive_common::{load_proxies, load_tokens, EventLog};
use pinghive_worker::{fetch_configuration, WorkerSettings};

use crate::cli::Cli;
use crate::monitor::SUMMARY_INTERVAL;
use crate::supervisor::{build_http_worker, Supervisor};

const BANNER: &str = r#"
╔══════════════════════════════════════╗
║        pinghive multi-account        ║
║          proxy support enabled       ║
╚══════════════════════════════════════╝
"#;

fn init_tracing(debug: bool) {
    let default = if debug {
        "pinghive=debug,pinghive_worker=debug,reqwest=info"
    } else {
        "pinghive=info,pinghive_worker=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    println!("{}", BANNER.cyan());

    // 1) Cuentas: sin archivo o sin tokens no hay nada que hacer
    let tokens = match load_tokens(&cli.accounts_file) {
        Ok(t) => t,
        Err(e) => {
            error!("{:#}", e);
            eprintln!(
                "{}",
                "Crea el archivo de cuentas con un token por línea".yellow()
            );
            process::exit(1);
        }
    };
    if tokens.is_empty() {
        error!(
            "no hay tokens válidos en {}",
            cli.accounts_file.display()
        );
        process::exit(1);
    }

    // 2) Proxies (opcionales)
    let proxies = load_proxies(&cli.proxy_file);
    if proxies.is_empty() {
        warn!("sin archivo de proxies o vacío, corriendo sin proxy");
    } else {
        info!("{} proxy(s) cargados", proxies.len());
    }
    info!("{} token(s) cargados", tokens.len());

    let settings = WorkerSettings::default().with_interval_override(cli.ping_interval);

    // 3) Configuración global, una sola vez con la primera cuenta
    let config = fetch_configuration(
        &cli.api_base,
        &tokens[0],
        proxies.first(),
        settings.request_timeout,
    )
    .await;
    match config.as_ref().and_then(|c| c.job_execution_delay) {
        Some(delay) => info!("config cargada (intervalo de ping: {}s)", delay),
        None => warn!(
            "usando intervalo de ping por defecto: {}s",
            settings.default_interval.as_secs_f64()
        ),
    }
    let config = Arc::new(config.unwrap_or_default());
    let events = Arc::new(EventLog::new(cli.logfile.clone()));

    // 4) Un worker por cuenta, arrancados escalonados
    let mut supervisor = Supervisor::default();
    for (i, token) in tokens.iter().enumerate() {
        match build_http_worker(
            i,
            token,
            &proxies,
            &cli.api_base,
            &settings,
            config.clone(),
            events.clone(),
        ) {
            Ok(worker) => supervisor.start(worker).await,
            Err(e) => error!("no se pudo crear el worker {}: {}", i + 1, e),
        }
    }

    if supervisor.is_empty() {
        error!("no arrancó ningún worker");
        process::exit(1);
    }

    info!("{} worker(s) arrancados, Ctrl+C para salir", supervisor.len());

    // 5) Resumen periódico hasta Ctrl+C
    tokio::select! {
        _ = monitor::report_forever(&supervisor, SUMMARY_INTERVAL) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                // sin señal no hay forma de pedir el stop: seguimos reportando
                warn!("no se pudo escuchar Ctrl+C: {}", e);
                monitor::report_forever(&supervisor, SUMMARY_INTERVAL).await;
            }
        }
    }

    println!("{}", "\nDeteniendo workers...".yellow());
    supervisor.shutdown().await;
    println!("{}", "Detenidos\n".green());

    Ok(())
}
