use clap::Parser;
use std::path::PathBuf;

/// URL base de la API:
/// - por defecto la de producción
/// - se puede cambiar con --api-base o PINGHIVE_API_BASE
#[derive(Parser, Debug)]
#[command(name = "pinghive")]
#[command(about = "Mantiene vivas varias cuentas con ping periódico, con soporte de proxy")]
pub struct Cli {
    /// Archivo de cuentas (un token por línea)
    #[arg(short = 'a', long, default_value = "accounts.txt", value_name = "ARCHIVO")]
    pub accounts_file: PathBuf,

    /// Archivo de proxies (opcional)
    #[arg(short = 'x', long, default_value = "proxy.txt", value_name = "ARCHIVO")]
    pub proxy_file: PathBuf,

    /// Fuerza el intervalo de ping (segundos)
    #[arg(short = 'p', long, value_name = "SEGUNDOS")]
    pub ping_interval: Option<f64>,

    /// Log CSV de eventos
    #[arg(short = 'l', long, value_name = "ARCHIVO")]
    pub logfile: Option<PathBuf>,

    /// Modo debug
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[arg(long, env = "PINGHIVE_API_BASE", default_value = pinghive_worker::API_BASE)]
    pub api_base: String,
}
