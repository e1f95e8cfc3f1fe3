//! Server settings read from the environment (after `.env` is loaded).

use axum::http::HeaderValue;
use std::net::SocketAddr;

pub const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// From ALLOWED_ORIGINS (comma-separated), else FRONTEND_ORIGIN.
    pub allowed_origins: Vec<String>,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            environment: "development".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|s| split_origins(&s))
            .filter(|origins| !origins.is_empty())
            .or_else(|| std::env::var("FRONTEND_ORIGIN").ok().map(|s| split_origins(&s)))
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.allowed_origins);

        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            allowed_origins,
            body_limit_bytes: std::env::var("BODY_LIMIT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.body_limit_bytes),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Origins that parse as header values; malformed entries are skipped.
    pub fn origin_headers(&self) -> Vec<HeaderValue> {
        self.allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect()
    }
}
