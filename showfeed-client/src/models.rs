use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use validator::Validate;

/// Категории, которые экран списка предлагает как быстрые фильтры.
pub const KNOWN_CATEGORIES: [&str; 6] = ["스트릿댄스", "힙합", "팝핑", "브레이킹", "왁킹", "락킹"];

/// Размер страницы ленты по умолчанию.
pub const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Публичная модель пользователя в том виде, в каком её отдаёт сервер.
pub struct UserIdentity {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Логин.
    pub username: String,
    /// Отображаемое имя.
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Email.
    #[serde(default)]
    pub email: String,
    /// Телефон, если указан при регистрации.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Признак администратора.
    #[serde(default)]
    pub is_admin: bool,
    /// Дата создания в формате сервера.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
/// Критерии поиска и фильтрации ленты.
///
/// Пустая категория означает «все категории».
pub struct FilterCriteria {
    /// Строка поиска.
    pub search_text: String,
    /// Категория или пустая строка.
    pub category: String,
}

impl FilterCriteria {
    /// Создаёт критерии из строки поиска и категории.
    pub fn new(search_text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            search_text: search_text.into(),
            category: category.into(),
        }
    }

    /// Строка поиска для query-параметра `search`; `None`, если пусто.
    pub fn search_param(&self) -> Option<&str> {
        non_blank(&self.search_text)
    }

    /// Категория для query-параметра `category`; `None` означает «все».
    pub fn category_param(&self) -> Option<&str> {
        non_blank(&self.category)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Параметры запроса одной страницы ленты.
pub struct PageQuery {
    /// Критерии фильтрации.
    pub filters: FilterCriteria,
    /// Номер страницы, начиная с 1.
    pub page: u32,
    /// Размер страницы.
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Карточка события в ленте.
pub struct EventSummary {
    /// Идентификатор события.
    pub id: i64,
    /// Название.
    pub title: String,
    /// Коллектив-исполнитель.
    pub group_name: String,
    /// Категория.
    pub category: String,
    /// Площадка.
    pub location: String,
    /// Дата в формате сервера.
    pub date: String,
    /// Время в формате сервера.
    pub time: String,
    /// Цена в формате сервера.
    pub price: String,
    /// Количество лайков.
    pub likes: u64,
    /// Ссылка на изображение.
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Полная информация о событии для экрана деталей.
pub struct EventDetail {
    /// Поля карточки.
    pub summary: EventSummary,
    /// Описание.
    pub description: String,
    /// Адрес площадки.
    pub address: Option<String>,
    /// Контактный email.
    pub contact_email: Option<String>,
    /// Телефон для бронирования.
    pub booking_phone: Option<String>,
    /// Сайт для бронирования.
    pub booking_website: Option<String>,
    /// Ссылка на покупку билета.
    pub ticket_url: Option<String>,
    /// Ссылка на видео.
    pub video_url: Option<String>,
    /// Способы покупки.
    pub purchase_methods: Vec<String>,
    /// Количество просмотров.
    pub view_count: u64,
    /// Количество комментариев.
    pub comment_count: u64,
    /// Лайк текущего пользователя. Живёт только в рамках сессии, не сохраняется.
    pub liked_by_me: bool,
}

impl EventDetail {
    /// Идентификатор события.
    pub fn id(&self) -> i64 {
        self.summary.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Метаданные пагинации из ответа сервера.
pub struct Pagination {
    /// Номер страницы, начиная с 1.
    pub page: u32,
    /// Размер страницы.
    pub per_page: u32,
    /// Общее количество событий.
    #[serde(default)]
    pub total: u64,
    /// Количество страниц.
    #[serde(default)]
    pub pages: u32,
    /// Есть ли следующая страница.
    pub has_next: bool,
    /// Есть ли предыдущая страница.
    #[serde(default)]
    pub has_prev: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Одна страница ленты.
pub struct FeedPage {
    /// События страницы в порядке сервера.
    pub items: Vec<EventSummary>,
    /// Пагинация.
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Ответ сервера на переключение лайка.
pub struct LikeOutcome {
    /// Состояние лайка по версии сервера.
    pub is_liked: bool,
    /// Итоговое количество лайков.
    pub likes_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Данные для регистрации.
pub struct Registration {
    /// Логин.
    pub username: String,
    /// Пароль.
    pub password: String,
    /// Отображаемое имя.
    pub name: String,
    /// Email.
    pub email: String,
    /// Телефон.
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
/// Заявка на публикацию нового события.
pub struct NewPerformance {
    /// Название (обязательно).
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Коллектив (обязательно).
    #[validate(length(min = 1, max = 200))]
    pub group_name: String,
    /// Площадка (обязательно).
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    /// Дата проведения.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Время начала, уходит на сервер как `HH:MM`.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_hour_minute"
    )]
    pub time: Option<NaiveTime>,
    /// Цена.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Категория.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Описание.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Контакты организатора.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl NewPerformance {
    /// Создаёт заявку с обязательными полями.
    pub fn new(
        title: impl Into<String>,
        group_name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            group_name: group_name.into(),
            location: location.into(),
            date: None,
            time: None,
            price: None,
            category: None,
            description: None,
            contact: None,
        }
    }

    /// Обрезает пробелы и превращает пустые необязательные поля в `None`.
    pub fn normalized(self) -> Self {
        let optional = |value: Option<String>| value.as_deref().and_then(non_blank).map(str::to_string);

        Self {
            title: self.title.trim().to_string(),
            group_name: self.group_name.trim().to_string(),
            location: self.location.trim().to_string(),
            date: self.date,
            time: self.time,
            price: optional(self.price),
            category: optional(self.category),
            description: optional(self.description),
            contact: optional(self.contact),
        }
    }
}

fn serialize_hour_minute<S: Serializer>(
    value: &Option<NaiveTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(time) => serializer.serialize_str(&time.format("%H:%M").to_string()),
        None => serializer.serialize_none(),
    }
}
