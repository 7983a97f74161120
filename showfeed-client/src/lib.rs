//! Клиентское ядро приложения с афишей выступлений.
//!
//! Состоит из нескольких частей:
//! - `SessionStore` хранит пользователя и токен поверх key-value хранилища;
//! - `RequestGateway` прикладывает токен к каждому запросу и сбрасывает
//!   сессию на ответ 401;
//! - `FeedController` ведёт ленту с поиском, фильтром по категории,
//!   pull-to-refresh и бесконечной прокруткой, отбрасывая устаревшие ответы;
//! - `LikeToggle` переключает лайк оптимистично и откатывает его при ошибке.
//!
//! `ShowfeedClient` связывает всё это с мобильным API.
#![warn(missing_docs)]

mod api;
mod config;
pub mod connectivity;
mod error;
mod feed;
mod gateway;
mod like;
mod models;
mod session;
mod storage;

pub use api::PerformanceSource;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use connectivity::{Connectivity, ConnectivityHandle};
pub use error::{
    ClientError, ClientResult, GatewayError, GatewayResult, SessionError, SessionResult,
};
pub use feed::{FeedController, FeedSnapshot, FeedStatus, FetchKind, PageRequest, Resolution};
pub use gateway::RequestGateway;
pub use like::{LikeToggle, PendingLike};
pub use models::{
    DEFAULT_PER_PAGE, EventDetail, EventSummary, FeedPage, FilterCriteria, KNOWN_CATEGORIES,
    LikeOutcome, NewPerformance, PageQuery, Pagination, Registration, UserIdentity,
};
pub use session::{
    CredentialSnapshot, Invalidation, ListenerId, Session, SessionStore, TOKEN_KEY, USER_KEY,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use validator::Validate;

use api::{AuthResponseDto, PerformanceApi};

const LOGIN_FAILED: &str = "login failed, please check your username and password";
const REGISTER_FAILED: &str = "registration failed, please try again";

#[derive(Debug, Clone)]
/// Клиент мобильного API с сохранением сессии.
pub struct ShowfeedClient {
    config: ClientConfig,
    session: Arc<SessionStore>,
    api: PerformanceApi,
}

impl ShowfeedClient {
    /// Создаёт клиент; токен для запросов берётся из `session`.
    pub fn new(config: ClientConfig, session: Arc<SessionStore>) -> ClientResult<Self> {
        let gateway = RequestGateway::new(&config, Arc::clone(&session))?;
        Ok(Self {
            config,
            session,
            api: PerformanceApi::new(gateway),
        })
    }

    /// Подключает признак сети: офлайн запросы сразу падают как `Unreachable`.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        let gateway = self.api.into_gateway().with_connectivity(connectivity);
        self.api = PerformanceApi::new(gateway);
        self
    }

    /// Настройки клиента.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Хранилище сессии.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Новая лента с размером страницы из настроек.
    pub fn feed(&self) -> FeedController {
        FeedController::new(self.config.per_page)
    }

    /// Текущий пользователь, если он сохранён.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.session.load().user().cloned()
    }

    /// Выполняет вход и сохраняет пользователя и токен (если сервер его выдал).
    ///
    /// Сообщение сервера об ошибке возвращается дословно в `AuthFailed`.
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Session> {
        let result = self.api.login(username.trim(), password).await;
        let session = self.store_auth(result, LOGIN_FAILED)?;
        info!(username = username.trim(), authenticated = session.credential().is_some(), "logged in");
        Ok(session)
    }

    /// Регистрирует пользователя и сохраняет его в сессии.
    pub async fn register(&self, registration: &Registration) -> ClientResult<Session> {
        let result = self.api.register(registration).await;
        let session = self.store_auth(result, REGISTER_FAILED)?;
        info!(username = registration.username.as_str(), "registered");
        Ok(session)
    }

    /// Выход: удаляет пользователя и токен.
    pub fn logout(&self) -> ClientResult<()> {
        self.session.clear()?;
        info!("logged out");
        Ok(())
    }

    /// Локально изменяет профиль сохранённого пользователя.
    pub fn update_profile<F>(&self, edit: F) -> ClientResult<Option<UserIdentity>>
    where
        F: FnOnce(&mut UserIdentity),
    {
        Ok(self.session.update_user(edit)?)
    }

    /// Загружает одну страницу ленты.
    pub async fn list_performances(&self, query: &PageQuery) -> ClientResult<FeedPage> {
        Ok(self.api.list_performances(query).await?)
    }

    /// Загружает подробности события.
    pub async fn get_performance(&self, id: i64) -> ClientResult<EventDetail> {
        Ok(self.api.get_performance(id).await?)
    }

    /// Отправляет заявку на новое событие. Возвращает сообщение сервера.
    pub async fn submit_performance(&self, form: NewPerformance) -> ClientResult<Option<String>> {
        let form = form.normalized();
        form.validate()?;
        let message = self.api.submit_performance(&form).await?;
        info!(title = form.title.as_str(), "performance submitted");
        Ok(message)
    }

    fn store_auth(
        &self,
        result: GatewayResult<AuthResponseDto>,
        fallback: &str,
    ) -> ClientResult<Session> {
        let dto = result.map_err(|err| match err {
            GatewayError::Unreachable(_) | GatewayError::InvalidResponse(_) => {
                ClientError::Gateway(err)
            }
            GatewayError::Rejected { .. } | GatewayError::Unauthorized { .. } => {
                ClientError::AuthFailed(err.server_message().unwrap_or(fallback).to_string())
            }
        })?;

        let session = Session::new(Some(dto.user), dto.token)?;
        self.session.save(&session)?;
        Ok(session)
    }
}

#[async_trait]
impl PerformanceSource for ShowfeedClient {
    async fn fetch_page(&self, query: &PageQuery) -> GatewayResult<FeedPage> {
        self.api.list_performances(query).await
    }

    async fn toggle_like(&self, event_id: i64) -> GatewayResult<LikeOutcome> {
        self.api.toggle_like(event_id).await
    }
}
