use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use uuid::Uuid;

/// Proxy ya normalizado: URL de salida para HTTP y para HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySpec {
    pub http: String,
    pub https: String,
}

impl ProxySpec {
    fn same(url: String) -> Self {
        Self {
            http: url.clone(),
            https: url,
        }
    }

    /// Host del proxy sin credenciales, para mostrar en consola.
    pub fn display(&self) -> &str {
        match self.http.rsplit_once('@') {
            Some((_, host)) => host,
            None => &self.http,
        }
    }
}

/// Limpia una línea del archivo de cuentas.
/// Acepta el token pelado o con prefijo `Bearer `.
pub fn normalize_token(line: &str) -> Option<String> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }

    let s = match s.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => s[7..].trim(),
        _ => s,
    };

    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Interpreta una línea del archivo de proxies.
///
/// Formatos aceptados:
/// - `socks5://...`, `http://...`, `https://...` (tal cual)
/// - `ip puerto usuario clave`
/// - `ip puerto`
/// - `usuario:clave@ip:puerto`
/// - `ip:puerto`
pub fn parse_proxy(line: &str) -> Option<ProxySpec> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }

    if s.starts_with("socks5://") || s.starts_with("http://") || s.starts_with("https://") {
        return Some(ProxySpec::same(s.to_string()));
    }

    let parts: Vec<&str> = s.split_whitespace().collect();
    let url = match parts.as_slice() {
        [ip, port, user, pass] => format!("http://{user}:{pass}@{ip}:{port}"),
        [ip, port] => format!("http://{ip}:{port}"),
        _ if s.contains(':') => format!("http://{s}"),
        _ => return None,
    };

    Some(ProxySpec::same(url))
}

fn content_lines(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push(line.to_string());
    }
    Ok(out)
}

/// Lee un token por línea. Si el archivo no existe es error.
pub fn load_tokens(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let lines = content_lines(path)
        .with_context(|| format!("no se pudo leer el archivo de cuentas {}", path.display()))?;

    Ok(lines.iter().filter_map(|l| normalize_token(l)).collect())
}

/// Lee los proxies. Sin archivo simplemente no hay proxies.
pub fn load_proxies(path: impl AsRef<Path>) -> Vec<ProxySpec> {
    match content_lines(path.as_ref()) {
        Ok(lines) => lines.iter().filter_map(|l| parse_proxy(l)).collect(),
        Err(_) => Vec::new(),
    }
}

/// Oculta el token dejando sólo los últimos caracteres.
pub fn mask_token(token: &str) -> String {
    const KEEP: usize = 8;
    let s = token.trim();
    if s.is_empty() {
        return "N/A".to_string();
    }
    let count = s.chars().count();
    if count <= KEEP {
        return s.to_string();
    }
    let tail: String = s.chars().skip(count - KEEP).collect();
    format!("...{tail}")
}

/// Id de dispositivo estable por token (UUID v5 en el namespace DNS).
pub fn device_id_for(token: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, token.trim().as_bytes()).to_string()
}
