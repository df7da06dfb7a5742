use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use tracing::info;

use crate::error::{ConsoleError, Result};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub timeout: Duration,
    /// Attempts for idempotent requests, at least 1.
    pub retries: u32,
    pub retry_delay: Duration,
    pub session_db: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(8),
            retries: 3,
            retry_delay: Duration::from_millis(500),
            session_db: "casino_console.db".to_string(),
        }
    }
}

impl Config {
    /// Client settings pointed at `base_url`, everything else default.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: normalize_base_url(&base_url.into()),
            ..Self::default()
        }
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read settings from the environment (and `.env`).
pub fn load() -> Result<Config> {
    dotenv().ok();
    let defaults = Config::default();

    let api_base_url = env::var("API_BASE_URL")
        .or_else(|_| env::var("CASINO_API_URL")) // alias support
        .map(|url| normalize_base_url(&url))
        .unwrap_or(defaults.api_base_url);

    if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
        return Err(ConsoleError::validation(format!(
            "API_BASE_URL must start with http:// or https:// (got {api_base_url:?})"
        )));
    }

    let timeout = Duration::from_secs(parse_env("API_TIMEOUT_SECS", 8u64).max(1));
    let retries = parse_env("API_RETRIES", defaults.retries).max(1);
    let retry_delay = Duration::from_millis(parse_env("API_RETRY_DELAY_MS", 500u64));

    let session_db = env::var("SESSION_DB").unwrap_or(defaults.session_db);

    let cfg = Config {
        api_base_url,
        timeout,
        retries,
        retry_delay,
        session_db,
    };

    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let cfg = Config::for_base_url(" http://127.0.0.1:8000/api/v1/ ");
        assert_eq!(cfg.api_base_url, "http://127.0.0.1:8000/api/v1");
        assert_eq!(cfg.timeout, Duration::from_secs(8));
        assert_eq!(cfg.retries, 3);
    }
}
