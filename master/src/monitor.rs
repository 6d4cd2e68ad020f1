use chrono::{DateTime, Utc};
use colored::Colorize;
use std::time::Duration;
use tokio::time::sleep;

use pinghive_common::WorkerStatus;

use crate::supervisor::{Supervisor, WorkerSummary};

/// Cada cuánto se imprime el resumen.
pub const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

pub fn render_header(summaries: &[WorkerSummary], now: DateTime<Utc>) -> String {
    let running = summaries.iter().filter(|s| s.running).count();
    format!(
        "[{}] === SUMMARY ({}/{} active) ===",
        now.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
        running,
        summaries.len()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    Up,
    Degraded,
    Down,
}

fn health(s: &WorkerSummary) -> Health {
    if !s.running {
        Health::Down
    } else if s.stats.status.is_degraded() || s.stats.status == WorkerStatus::Initializing {
        Health::Degraded
    } else {
        Health::Up
    }
}

fn icon(s: &WorkerSummary) -> &'static str {
    match health(s) {
        Health::Up => "✓",
        Health::Degraded => "⚠",
        Health::Down => "✗",
    }
}

/// Una línea por worker: estado, uptime, pings, tasa de éxito y puntos.
pub fn render_line(s: &WorkerSummary, now: DateTime<Utc>) -> String {
    let st = &s.stats;
    format!(
        "  {} [{}] {} | up:{}m | ping:{} (✓{}/✗{}) | rate:{:.1}% | pts:{}",
        icon(s),
        s.name,
        st.status,
        st.uptime_secs(now) / 60,
        st.total,
        st.ok,
        st.fail,
        st.success_rate(),
        st.points
    )
}

pub fn print_summary(summaries: &[WorkerSummary]) {
    let now = Utc::now();
    println!();
    println!("{}", render_header(summaries, now).magenta());
    for s in summaries {
        let line = render_line(s, now);
        let line = match health(s) {
            Health::Up => line.green(),
            Health::Degraded => line.yellow(),
            Health::Down => line.red(),
        };
        println!("{}", line);
    }
}

/// Imprime el resumen cada `every` hasta que el futuro se descarte.
pub async fn report_forever(supervisor: &Supervisor, every: Duration) {
    loop {
        sleep(every).await;
        print_summary(&supervisor.snapshot());
    }
}
