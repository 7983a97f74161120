use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use showfeed_client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_PER_PAGE};

const DEFAULT_SESSION_FILE: &str = ".showfeed_session.json";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub per_page: u32,
    pub session_file: PathBuf,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Собирает настройки из произвольного источника переменных.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = non_blank(&lookup, "SHOWFEED_API_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let request_timeout_secs =
            parse_positive(&lookup, "SHOWFEED_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let per_page = parse_positive(&lookup, "SHOWFEED_PER_PAGE", u64::from(DEFAULT_PER_PAGE))?;
        let per_page = u32::try_from(per_page)
            .context("Failed to parse SHOWFEED_PER_PAGE, value is too large")?;
        let session_file = non_blank(&lookup, "SHOWFEED_SESSION_FILE")
            .unwrap_or_else(|| DEFAULT_SESSION_FILE.to_string())
            .into();
        let log_level = non_blank(&lookup, "LOG_LEVEL")
            .or_else(|| non_blank(&lookup, "RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            api_url,
            request_timeout_secs,
            per_page,
            session_file,
            log_level,
        })
    }

    /// Настройки клиента; `server` из `--server` имеет приоритет над окружением.
    pub fn client_config(&self, server: Option<String>) -> ClientConfig {
        let base_url = normalize_server(server.unwrap_or_else(|| self.api_url.clone()));
        ClientConfig {
            base_url,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            per_page: self.per_page,
            ..ClientConfig::default()
        }
    }
}

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key)?.trim().to_string();
    if value.is_empty() { None } else { Some(value) }
}

fn parse_positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = non_blank(lookup, key)
        .unwrap_or_else(|| default.to_string())
        .parse::<u64>()
        .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?;

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

fn normalize_server(server: String) -> String {
    let server = server.trim().trim_end_matches('/').to_string();
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}
