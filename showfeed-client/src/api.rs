use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GatewayResult;
use crate::gateway::RequestGateway;
use crate::models::{
    EventDetail, EventSummary, FeedPage, LikeOutcome, NewPerformance, PageQuery, Pagination,
    Registration, UserIdentity,
};

/// Источник данных для ленты и лайков.
///
/// Реализуется клиентом поверх HTTP; в тестах подменяется фейком.
#[async_trait]
pub trait PerformanceSource: Send + Sync {
    /// Загружает одну страницу ленты.
    async fn fetch_page(&self, query: &PageQuery) -> GatewayResult<FeedPage>;

    /// Переключает лайк события на сервере.
    async fn toggle_like(&self, event_id: i64) -> GatewayResult<LikeOutcome>;
}

#[derive(Debug, Serialize)]
struct LoginRequestDto<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequestDto<'a> {
    username: &'a str,
    password: &'a str,
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponseDto {
    pub(crate) user: UserIdentity,
    #[serde(default)]
    pub(crate) token: Option<String>,
}

#[derive(Serialize)]
struct ListPerformancesQuery<'a> {
    page: u32,
    per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PerformancesResponseDto {
    #[serde(default)]
    performances: Vec<PerformanceDto>,
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct PerformanceDetailResponseDto {
    performance: PerformanceDto,
}

#[derive(Debug, Deserialize)]
struct LikeResponseDto {
    is_liked: bool,
    likes_count: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponseDto {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PerformanceDto {
    id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    group_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    time: String,
    #[serde(default, deserialize_with = "price_as_string")]
    price: String,
    #[serde(default, deserialize_with = "null_as_default")]
    likes: u64,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    description: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    contact_email: Option<String>,
    #[serde(default)]
    booking_phone: Option<String>,
    #[serde(default)]
    booking_website: Option<String>,
    #[serde(default)]
    ticket_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    purchase_methods: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    view_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    comment_count: u64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Цена приходит то строкой, то числом.
fn price_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(price)) => price,
        Some(serde_json::Value::Number(price)) => price.to_string(),
        _ => String::new(),
    })
}

impl PerformanceDto {
    fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            group_name: self.group_name.clone(),
            category: self.category.clone(),
            location: self.location.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            price: self.price.clone(),
            likes: self.likes,
            image_url: self.image_url.clone(),
        }
    }
}

impl From<PerformanceDto> for EventSummary {
    fn from(value: PerformanceDto) -> Self {
        value.summary()
    }
}

impl From<PerformanceDto> for EventDetail {
    fn from(value: PerformanceDto) -> Self {
        Self {
            summary: value.summary(),
            description: value.description,
            address: value.address,
            contact_email: value.contact_email,
            booking_phone: value.booking_phone,
            booking_website: value.booking_website,
            ticket_url: value.ticket_url,
            video_url: value.video_url,
            purchase_methods: value.purchase_methods,
            view_count: value.view_count,
            comment_count: value.comment_count,
            liked_by_me: false,
        }
    }
}

impl From<PerformancesResponseDto> for FeedPage {
    fn from(value: PerformancesResponseDto) -> Self {
        Self {
            items: value.performances.into_iter().map(EventSummary::from).collect(),
            pagination: value.pagination,
        }
    }
}

impl From<LikeResponseDto> for LikeOutcome {
    fn from(value: LikeResponseDto) -> Self {
        Self {
            is_liked: value.is_liked,
            likes_count: value.likes_count,
        }
    }
}

/// Операции мобильного API поверх [`RequestGateway`].
#[derive(Debug, Clone)]
pub(crate) struct PerformanceApi {
    gateway: RequestGateway,
}

impl PerformanceApi {
    pub(crate) fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }

    pub(crate) fn into_gateway(self) -> RequestGateway {
        self.gateway
    }

    pub(crate) async fn login(&self, username: &str, password: &str) -> GatewayResult<AuthResponseDto> {
        let payload = LoginRequestDto { username, password };
        self.gateway.post_json("/auth/login", &payload).await
    }

    pub(crate) async fn register(&self, registration: &Registration) -> GatewayResult<AuthResponseDto> {
        let payload = RegisterRequestDto {
            username: &registration.username,
            password: &registration.password,
            name: &registration.name,
            email: &registration.email,
            phone: registration
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|phone| !phone.is_empty()),
        };
        self.gateway.post_json("/auth/register", &payload).await
    }

    pub(crate) async fn list_performances(&self, query: &PageQuery) -> GatewayResult<FeedPage> {
        let params = ListPerformancesQuery {
            page: query.page.max(1),
            per_page: query.per_page.max(1),
            search: query.filters.search_param(),
            category: query.filters.category_param(),
        };
        let dto: PerformancesResponseDto = self.gateway.get_json("/performances", &params).await?;
        Ok(dto.into())
    }

    pub(crate) async fn get_performance(&self, id: i64) -> GatewayResult<EventDetail> {
        let dto: PerformanceDetailResponseDto = self
            .gateway
            .get_json(&format!("/performances/{id}"), &[] as &[(&str, &str)])
            .await?;
        Ok(dto.performance.into())
    }

    pub(crate) async fn toggle_like(&self, id: i64) -> GatewayResult<LikeOutcome> {
        let dto: LikeResponseDto = self
            .gateway
            .post_empty(&format!("/performances/{id}/like"))
            .await?;
        Ok(dto.into())
    }

    pub(crate) async fn submit_performance(&self, form: &NewPerformance) -> GatewayResult<Option<String>> {
        let dto: SubmitResponseDto = self.gateway.post_json("/performances", form).await?;
        Ok(dto.message)
    }
}
