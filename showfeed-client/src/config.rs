use std::time::Duration;

use crate::models::DEFAULT_PER_PAGE;

/// Базовый URL мобильного API по умолчанию.
pub const DEFAULT_BASE_URL: &str = "https://kopis-performance.onrender.com/api/mobile";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Настройки клиента.
pub struct ClientConfig {
    /// Базовый URL API, например `http://127.0.0.1:8080/api/mobile`.
    pub base_url: String,
    /// Потолок на весь запрос; по истечении запрос падает как `Unreachable`.
    pub request_timeout: Duration,
    /// Таймаут установки соединения.
    pub connect_timeout: Duration,
    /// Размер страницы ленты.
    pub per_page: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ClientConfig {
    /// Настройки по умолчанию с другим базовым URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
