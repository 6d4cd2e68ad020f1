use pinghive_common::WorkerStatus;
use thiserror::Error;

/// Fallos de una llamada a la API.
///
/// Sólo `AuthRejected` es fatal; el resto alimenta el backoff y el
/// worker vuelve a intentar.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("token rechazado (HTTP {status})")]
    AuthRejected { status: u16 },

    #[error("error de proxy: {0}")]
    ProxyFailure(String),

    #[error("timeout")]
    Timeout,

    #[error("error de transporte: {0}")]
    Transport(String),

    #[error("HTTP {status} inesperado")]
    UnexpectedStatus { status: u16, body: String },
}

impl ApiError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::AuthRejected { .. })
    }

    /// Estado del worker que corresponde a este fallo.
    pub fn status(&self) -> WorkerStatus {
        match self {
            ApiError::AuthRejected { .. } => WorkerStatus::InvalidToken,
            ApiError::ProxyFailure(_) => WorkerStatus::ProxyError,
            ApiError::Timeout => WorkerStatus::Timeout,
            ApiError::Transport(_) | ApiError::UnexpectedStatus { .. } => WorkerStatus::Error,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            ApiError::AuthRejected { status } | ApiError::UnexpectedStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Clasifica un error de reqwest. Con proxy configurado, un error de
    /// conexión se atribuye al proxy.
    pub fn from_reqwest(err: reqwest::Error, proxied: bool) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if proxied && err.is_connect() {
            ApiError::ProxyFailure(short(&err.to_string()))
        } else {
            ApiError::Transport(short(&err.to_string()))
        }
    }
}

/// Recorta textos largos (mensajes de error, cuerpos de respuesta).
pub fn short(s: &str) -> String {
    truncate(s, 100)
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_auth_es_fatal() {
        assert!(ApiError::AuthRejected { status: 403 }.is_fatal());
        assert!(!ApiError::Timeout.is_fatal());
        assert!(!ApiError::ProxyFailure("x".into()).is_fatal());
        assert!(!ApiError::UnexpectedStatus { status: 429, body: String::new() }.is_fatal());
    }

    #[test]
    fn mapea_a_estado_del_worker() {
        assert_eq!(
            ApiError::AuthRejected { status: 401 }.status(),
            WorkerStatus::InvalidToken
        );
        assert_eq!(ApiError::ProxyFailure("x".into()).status(), WorkerStatus::ProxyError);
        assert_eq!(ApiError::Timeout.status(), WorkerStatus::Timeout);
        assert_eq!(ApiError::Transport("x".into()).status(), WorkerStatus::Error);
        assert_eq!(
            ApiError::UnexpectedStatus { status: 500, body: String::new() }.status(),
            WorkerStatus::Error
        );
    }

    #[test]
    fn http_status_solo_cuando_hubo_respuesta() {
        assert_eq!(
            ApiError::UnexpectedStatus { status: 502, body: String::new() }.http_status(),
            Some(502)
        );
        assert_eq!(ApiError::AuthRejected { status: 403 }.http_status(), Some(403));
        assert_eq!(ApiError::Timeout.http_status(), None);
    }

    #[test]
    fn truncate_respeta_caracteres() {
        assert_eq!(truncate("ñandú", 3), "ñan");
        assert_eq!(short("abc"), "abc");
    }
}
