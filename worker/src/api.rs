use std::{future::Future, time::Duration};

use pinghive_common::{GlobalConfig, ProxySpec};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Proxy, Response,
};
use serde_json::Value;
use tracing::debug;

use crate::error::{short, truncate, ApiError};

/// Perfil devuelto por `GET /user`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    /// `None` si la respuesta no trae un entero en `points`.
    pub points: Option<i64>,
    pub email: Option<String>,
}

impl UserProfile {
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            points: obj.get("points").and_then(as_points),
            email: obj.get("email").and_then(|e| e.as_str()).map(str::to_string),
        })
    }
}

/// Respuesta 200 de un ping. El cuerpo puede no ser JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingReply {
    pub body: Option<Value>,
    pub text: String,
}

impl PingReply {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            body: serde_json::from_str(&text).ok(),
            text,
        }
    }

    pub fn points(&self) -> Option<i64> {
        self.body.as_ref()?.get("points").and_then(as_points)
    }

    /// Resumen corto de la respuesta para consola y CSV.
    pub fn snippet(&self, max_chars: usize) -> String {
        match &self.body {
            Some(v) => truncate(&v.to_string(), max_chars),
            None => truncate(&self.text, max_chars),
        }
    }
}

fn as_points(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

/// Lo que el worker necesita de la API. La implementación real es
/// [`HttpApi`]; los tests usan respuestas guionadas.
pub trait AccountApi: Send + Sync + 'static {
    fn fetch_user(&self) -> impl Future<Output = Result<UserProfile, ApiError>> + Send;
    fn ping(&self) -> impl Future<Output = Result<PingReply, ApiError>> + Send;
}

/// Cliente HTTP de un worker: headers de fingerprint y proxy propios.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    proxied: bool,
}

fn header_map(headers: &[(&str, String)]) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::Transport(format!("header inválido {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::Transport(format!("valor inválido para {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn build_client(
    headers: HeaderMap,
    proxy: Option<&ProxySpec>,
    timeout: Duration,
) -> Result<Client, ApiError> {
    let mut builder = Client::builder().default_headers(headers).timeout(timeout);

    if let Some(p) = proxy {
        let http = Proxy::http(&p.http)
            .map_err(|e| ApiError::ProxyFailure(format!("proxy inválido {}: {e}", p.display())))?;
        let https = Proxy::https(&p.https)
            .map_err(|e| ApiError::ProxyFailure(format!("proxy inválido {}: {e}", p.display())))?;
        builder = builder.proxy(http).proxy(https);
    }

    builder
        .build()
        .map_err(|e| ApiError::Transport(short(&e.to_string())))
}

impl HttpApi {
    pub fn new(
        base_url: &str,
        headers: &[(&str, String)],
        proxy: Option<&ProxySpec>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = build_client(header_map(headers)?, proxy, timeout)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            proxied: proxy.is_some(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport(&self, err: reqwest::Error) -> ApiError {
        ApiError::from_reqwest(err, self.proxied)
    }

    /// Separa 200 / 401-403 / resto. Devuelve el cuerpo de los 200.
    async fn classify(&self, resp: Response) -> Result<String, ApiError> {
        let status = resp.status().as_u16();
        match status {
            200 => Ok(resp.text().await.unwrap_or_default()),
            401 | 403 => Err(ApiError::AuthRejected { status }),
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(ApiError::UnexpectedStatus {
                    status,
                    body: truncate(&body, 300),
                })
            }
        }
    }
}

impl AccountApi for HttpApi {
    async fn fetch_user(&self) -> Result<UserProfile, ApiError> {
        let resp = self
            .client
            .get(self.url("/user"))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        debug!("GET /user -> {}", resp.status());

        let text = self.classify(resp).await?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ApiError::Transport(format!("respuesta /user inválida: {e}")))?;
        UserProfile::from_json(&value)
            .ok_or_else(|| ApiError::Transport("respuesta /user no es un objeto".to_string()))
    }

    async fn ping(&self) -> Result<PingReply, ApiError> {
        let resp = self
            .client
            .post(self.url("/ping"))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        debug!("POST /ping -> {}", resp.status());

        let text = self.classify(resp).await?;
        Ok(PingReply::from_text(text))
    }
}

/// Pide la configuración global una sola vez. Cualquier fallo => `None`
/// y se usan los valores por defecto.
pub async fn fetch_configuration(
    base_url: &str,
    token: &str,
    proxy: Option<&ProxySpec>,
    timeout: Duration,
) -> Option<GlobalConfig> {
    let headers = [
        ("Accept", "application/json".to_string()),
        (
            "User-Agent",
            format!("pinghive/{}", env!("CARGO_PKG_VERSION")),
        ),
        ("Authorization", format!("Bearer {token}")),
    ];

    let client = match header_map(&headers).and_then(|h| build_client(h, proxy, timeout)) {
        Ok(c) => c,
        Err(e) => {
            debug!("no se pudo armar el cliente de configuración: {}", e);
            return None;
        }
    };

    let url = format!("{}/configuration", base_url.trim_end_matches('/'));
    let resp = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!("GET /configuration falló: {}", short(&e.to_string()));
            return None;
        }
    };

    let status = resp.status().as_u16();
    debug!("GET /configuration -> {}", status);
    if status != 200 && status != 201 {
        return None;
    }

    let value: Value = resp.json().await.ok()?;
    GlobalConfig::from_json(&value)
}
