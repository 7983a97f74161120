use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connectivity::Connectivity;
use crate::error::{ClientError, ClientResult, GatewayError, GatewayResult};
use crate::session::SessionStore;

#[derive(Debug, Default, Deserialize)]
struct StatusEnvelopeDto {
    success: Option<bool>,
    error: Option<String>,
    message: Option<String>,
}

impl StatusEnvelopeDto {
    fn into_message(self) -> Option<String> {
        self.error
            .or(self.message)
            .filter(|message| !message.trim().is_empty())
    }
}

/// Шлюз для всех исходящих запросов.
///
/// Перед отправкой прикладывает `Authorization: Bearer <token>`, если токен
/// сохранён. На ответ 401 сбрасывает сессию, уведомляет подписчиков и только
/// потом возвращает ошибку вызывающему коду.
#[derive(Debug, Clone)]
pub struct RequestGateway {
    base_url: String,
    client: Client,
    session: Arc<SessionStore>,
    connectivity: Option<Connectivity>,
}

impl RequestGateway {
    /// Создаёт шлюз с таймаутами из настроек.
    pub fn new(config: &ClientConfig, session: Arc<SessionStore>) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ClientError::Setup(err.to_string()))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
            session,
            connectivity: None,
        })
    }

    /// Подключает признак сети: пока он `false`, запросы не уходят.
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Хранилище сессии, из которого берётся токен.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET с query-параметрами.
    pub async fn get_json<Q, T>(&self, path: &str, query: &Q) -> GatewayResult<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.get(self.endpoint(path)).query(query);
        self.execute(Method::GET, path, request).await
    }

    /// POST с JSON-телом.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> GatewayResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.endpoint(path)).json(body);
        self.execute(Method::POST, path, request).await
    }

    /// POST без тела.
    pub async fn post_empty<T>(&self, path: &str) -> GatewayResult<T>
    where
        T: DeserializeOwned,
    {
        let request = self.client.post(self.endpoint(path));
        self.execute(Method::POST, path, request).await
    }

    async fn execute<T>(&self, method: Method, path: &str, request: RequestBuilder) -> GatewayResult<T>
    where
        T: DeserializeOwned,
    {
        if let Some(connectivity) = &self.connectivity {
            if !connectivity.is_online() {
                debug!(%method, path, "device offline, request not sent");
                return Err(GatewayError::Unreachable("device is offline".to_string()));
            }
        }

        let snapshot = self.session.snapshot();
        let request = match snapshot.credential() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        debug!(
            %method,
            path,
            authenticated = snapshot.credential().is_some(),
            "sending request"
        );

        let response = request.send().await.map_err(|err| {
            warn!(%method, path, error = %err, "request failed before response");
            GatewayError::from_reqwest(err)
        })?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            let message = response
                .bytes()
                .await
                .ok()
                .and_then(|body| error_message(&body));
            self.session.invalidate(snapshot.generation());
            return Err(GatewayError::Unauthorized { message });
        }

        let body = response.bytes().await.map_err(GatewayError::from_reqwest)?;
        decode_body(status, &body)
    }
}

fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<StatusEnvelopeDto>(body)
        .ok()
        .and_then(StatusEnvelopeDto::into_message)
}

/// Разбирает тело ответа: не-2xx и `success: false` превращаются в `Rejected`.
pub(crate) fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> GatewayResult<T> {
    if !status.is_success() {
        return Err(GatewayError::from_http_status(status, error_message(body)));
    }

    let envelope = serde_json::from_slice::<StatusEnvelopeDto>(body)
        .map_err(|err| GatewayError::InvalidResponse(err.to_string()))?;
    if envelope.success == Some(false) {
        return Err(GatewayError::Rejected {
            status: None,
            message: envelope.into_message(),
        });
    }

    serde_json::from_slice::<T>(body).map_err(|err| GatewayError::InvalidResponse(err.to_string()))
}
