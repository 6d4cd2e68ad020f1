use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Tipo de evento registrado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Login,
    Ping,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    Ok,
    Fail,
}

/// Una fila del CSV. El orden de los campos es el de las columnas.
#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub timestamp: String,
    pub account: String,
    pub action: EventAction,
    pub status: EventOutcome,
    pub http_code: Option<u16>,
    pub points: i64,
    pub message: String,
}

impl EventRow {
    pub fn now(
        account: &str,
        action: EventAction,
        status: EventOutcome,
        http_code: Option<u16>,
        points: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            account: account.to_string(),
            action,
            status,
            http_code,
            points,
            message: message.into(),
        }
    }
}

/// Log CSV de sólo-append compartido por todos los workers.
/// Sin ruta configurada no escribe nada.
#[derive(Debug, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
    // serializa escrituras para que las filas no se mezclen
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Agrega una fila; el encabezado se escribe sólo si el archivo está vacío.
    pub fn append(&self, row: &EventRow) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("lock del log de eventos envenenado"))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("no se pudo abrir {}", path.display()))?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }
}
