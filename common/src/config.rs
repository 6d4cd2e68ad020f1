use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Versión de extensión que se usa si la API no manda ninguna.
pub const DEFAULT_EXTENSION_VERSION: &str = "0.2.5";

/// Configuración global que entrega `GET /configuration`.
///
/// La API usa indistintamente snake_case y camelCase para las claves,
/// así que el payload se normaliza acá, una sola vez, al decodificarlo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Intervalo sugerido entre pings, en segundos.
    pub job_execution_delay: Option<f64>,
    pub min_extension_version: Option<String>,
}

impl GlobalConfig {
    /// Decodifica el JSON remoto. Devuelve `None` si no es un objeto.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let job_execution_delay =
            lookup(obj, "job_execution_delay", "jobExecutionDelay", as_seconds);

        let min_extension_version =
            lookup(obj, "min_extension_version", "minExtensionVersion", |v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });

        Some(Self {
            job_execution_delay,
            min_extension_version,
        })
    }

    pub fn extension_version(&self) -> &str {
        self.min_extension_version
            .as_deref()
            .unwrap_or(DEFAULT_EXTENSION_VERSION)
    }
}

// Gana snake_case; si su valor no sirve se prueba la clave camelCase.
fn lookup<T>(
    obj: &serde_json::Map<String, Value>,
    snake: &str,
    camel: &str,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    obj.get(snake)
        .and_then(&parse)
        .or_else(|| obj.get(camel).and_then(&parse))
}

fn as_seconds(v: &Value) -> Option<f64> {
    let secs = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    positive_secs(secs).map(|_| secs)
}

/// Segundos como `Duration`, sólo si son positivos y representables.
pub fn positive_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
