//! HTTP server configuration.

use axum::http::HeaderValue;
use tracing::warn;

use ondeu_core::defaults::{MAX_UPLOAD_BYTES, SERVER_PORT};

/// Listener and request-shaping settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means no cross-origin access.
    pub allowed_origins: Vec<HeaderValue>,
    /// Largest accepted request body, uploads included.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: SERVER_PORT,
            allowed_origins: vec![HeaderValue::from_static("http://localhost:3000")],
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `8080` | Bind port |
    /// | `CORS_ALLOWED_ORIGINS` | `http://localhost:3000` | Comma-separated origins |
    /// | `MAX_UPLOAD_BYTES` | 64 MiB | Request body limit |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let allowed_origins = match std::env::var("CORS_ALLOWED_ORIGINS") {
            Ok(raw) => parse_allowed_origins(&raw),
            Err(_) => defaults.allowed_origins,
        };
        let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_upload_bytes);

        Self {
            host,
            port,
            allowed_origins,
            max_upload_bytes,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a comma-separated origin list, skipping entries that are not valid
/// header values.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(origin = %trimmed, error = %e, "Invalid CORS origin");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allowed_origins_skips_blanks() {
        let origins = parse_allowed_origins("https://app.ondeu.kz, ,http://localhost:5173,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://app.ondeu.kz");
        assert_eq!(origins[1], "http://localhost:5173");
    }

    #[test]
    fn test_bind_address() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_address(), "127.0.0.1:9000");
    }
}
