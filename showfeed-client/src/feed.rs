//! Состояние ленты событий: фильтры, пагинация и защита от гонок.
//!
//! Контроллер не ходит в сеть сам. Каждая операция возвращает
//! [`PageRequest`], вызывающий код отправляет его и передаёт результат в
//! [`FeedController::resolve`]. Ответ применяется только если эпоха запроса
//! совпадает с текущей, иначе он молча отбрасывается.

use tracing::{debug, warn};

use crate::api::PerformanceSource;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{DEFAULT_PER_PAGE, EventSummary, FeedPage, FilterCriteria, PageQuery};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Что сейчас делает лента.
pub enum FeedStatus {
    /// Запросов в полёте нет.
    #[default]
    Idle,
    /// Полная перезагрузка после смены фильтров; список пуст.
    Loading,
    /// Догрузка следующей страницы.
    LoadingMore,
    /// Pull-to-refresh; старый список остаётся на экране.
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Как результат запроса ляжет в список.
pub enum FetchKind {
    /// Заменить список (смена фильтров или явная перезагрузка).
    Reload,
    /// Заменить список (pull-to-refresh).
    Refresh,
    /// Дописать в конец списка.
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Запрос страницы, выданный контроллером.
pub struct PageRequest {
    epoch: u64,
    kind: FetchKind,
    query: PageQuery,
}

impl PageRequest {
    /// Эпоха, активная на момент выдачи запроса.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Тип запроса.
    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    /// Параметры для сервера.
    pub fn query(&self) -> &PageQuery {
        &self.query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Итог применения ответа.
pub enum Resolution {
    /// Ответ применён; `received` событий пришло в странице.
    Applied {
        /// Размер полученной страницы.
        received: usize,
    },
    /// Ответ устарел и отброшен.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Снимок состояния ленты для отрисовки.
pub struct FeedSnapshot {
    /// Текущие фильтры.
    pub filters: FilterCriteria,
    /// Загруженные события.
    pub items: Vec<EventSummary>,
    /// Номер последней загруженной страницы.
    pub page: u32,
    /// Есть ли ещё страницы.
    pub has_next: bool,
    /// Статус.
    pub status: FeedStatus,
    /// Текущая эпоха.
    pub epoch: u64,
}

#[derive(Debug, Clone)]
/// Контроллер ленты.
pub struct FeedController {
    filters: FilterCriteria,
    items: Vec<EventSummary>,
    page: u32,
    has_next: bool,
    status: FeedStatus,
    epoch: u64,
    per_page: u32,
}

impl Default for FeedController {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

impl FeedController {
    /// Создаёт пустую ленту с заданным размером страницы.
    pub fn new(per_page: u32) -> Self {
        Self {
            filters: FilterCriteria::default(),
            items: Vec::new(),
            page: 0,
            has_next: true,
            status: FeedStatus::Idle,
            epoch: 0,
            per_page: per_page.max(1),
        }
    }

    /// Меняет фильтры и перезагружает ленту с первой страницы.
    ///
    /// `None`, если фильтры не изменились.
    pub fn set_filters(&mut self, filters: FilterCriteria) -> Option<PageRequest> {
        if filters == self.filters {
            return None;
        }
        self.filters = filters;
        Some(self.reload())
    }

    /// Безусловная перезагрузка с текущими фильтрами: первый показ экрана
    /// или повтор после ошибки.
    pub fn reload(&mut self) -> PageRequest {
        self.epoch += 1;
        self.items.clear();
        self.page = 0;
        self.has_next = true;
        self.status = FeedStatus::Loading;
        self.issue(FetchKind::Reload, 1)
    }

    /// Pull-to-refresh: новая эпоха, список остаётся до прихода ответа.
    pub fn refresh(&mut self) -> PageRequest {
        self.epoch += 1;
        self.status = FeedStatus::Refreshing;
        self.issue(FetchKind::Refresh, 1)
    }

    /// Догрузка следующей страницы в текущей эпохе.
    ///
    /// `None`, если уже идёт запрос или страниц больше нет.
    pub fn load_more(&mut self) -> Option<PageRequest> {
        if self.status != FeedStatus::Idle || !self.has_next {
            debug!(status = ?self.status, has_next = self.has_next, "load_more ignored");
            return None;
        }
        self.status = FeedStatus::LoadingMore;
        Some(self.issue(FetchKind::Append, self.page + 1))
    }

    /// Применяет результат запроса.
    ///
    /// Результат запроса из прошлой эпохи отбрасывается вместе с ошибкой.
    /// Ошибка текущей эпохи возвращает ленту в `Idle`, не трогая список.
    pub fn resolve(
        &mut self,
        request: PageRequest,
        outcome: GatewayResult<FeedPage>,
    ) -> Result<Resolution, GatewayError> {
        if request.epoch != self.epoch {
            debug!(
                request_epoch = request.epoch,
                current_epoch = self.epoch,
                page = request.query.page,
                "discarding stale feed response"
            );
            return Ok(Resolution::Stale);
        }

        match outcome {
            Ok(page) => {
                let received = page.items.len();
                match request.kind {
                    FetchKind::Append => self.items.extend(page.items),
                    FetchKind::Reload | FetchKind::Refresh => self.items = page.items,
                }
                self.page = page.pagination.page;
                self.has_next = page.pagination.has_next;
                self.status = FeedStatus::Idle;
                debug!(
                    epoch = self.epoch,
                    page = self.page,
                    received,
                    total = self.items.len(),
                    "feed page applied"
                );
                Ok(Resolution::Applied { received })
            }
            Err(err) => {
                warn!(epoch = self.epoch, kind = ?request.kind, error = %err, "feed fetch failed");
                self.status = FeedStatus::Idle;
                Err(err)
            }
        }
    }

    /// Отправляет запрос через источник и применяет результат.
    pub async fn drive<S>(&mut self, source: &S, request: PageRequest) -> Result<Resolution, GatewayError>
    where
        S: PerformanceSource + ?Sized,
    {
        let outcome = source.fetch_page(&request.query).await;
        self.resolve(request, outcome)
    }

    /// Переносит подтверждённое сервером число лайков в карточку списка.
    ///
    /// Возвращает `false`, если события нет в загруженных страницах.
    pub fn update_like_count(&mut self, event_id: i64, likes: u64) -> bool {
        match self.items.iter_mut().find(|item| item.id == event_id) {
            Some(item) => {
                item.likes = likes;
                true
            }
            None => false,
        }
    }

    /// Текущие фильтры.
    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    /// Загруженные события.
    pub fn items(&self) -> &[EventSummary] {
        &self.items
    }

    /// Номер последней загруженной страницы.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Есть ли ещё страницы.
    pub fn has_next(&self) -> bool {
        self.has_next
    }

    /// Статус.
    pub fn status(&self) -> FeedStatus {
        self.status
    }

    /// Текущая эпоха.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Снимок для отрисовки.
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            filters: self.filters.clone(),
            items: self.items.clone(),
            page: self.page,
            has_next: self.has_next,
            status: self.status,
            epoch: self.epoch,
        }
    }

    fn issue(&self, kind: FetchKind, page: u32) -> PageRequest {
        debug!(epoch = self.epoch, ?kind, page, "issuing feed request");
        PageRequest {
            epoch: self.epoch,
            kind,
            query: PageQuery {
                filters: self.filters.clone(),
                page,
                per_page: self.per_page,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pagination;

    fn event(id: i64) -> EventSummary {
        EventSummary {
            id,
            title: format!("event {id}"),
            group_name: "crew".to_string(),
            category: String::new(),
            location: "Seoul".to_string(),
            date: "2026-10-19".to_string(),
            time: "19:00".to_string(),
            price: "10000".to_string(),
            likes: 0,
            image_url: None,
        }
    }

    fn page(number: u32, ids: std::ops::Range<i64>, has_next: bool) -> FeedPage {
        FeedPage {
            items: ids.map(event).collect(),
            pagination: Pagination {
                page: number,
                per_page: 20,
                has_next,
                ..Pagination::default()
            },
        }
    }

    #[test]
    fn same_filters_do_not_reload() {
        let mut feed = FeedController::default();
        assert!(feed.set_filters(FilterCriteria::default()).is_none());
        assert_eq!(feed.epoch(), 0);

        let request = feed
            .set_filters(FilterCriteria::new("dance", ""))
            .expect("changed filters must reload");
        assert_eq!(request.epoch(), 1);
        assert_eq!(request.query().page, 1);
        assert_eq!(feed.status(), FeedStatus::Loading);
    }

    #[test]
    fn load_more_is_gated_by_status_and_has_next() {
        let mut feed = FeedController::default();
        let first = feed.reload();
        assert!(feed.load_more().is_none(), "blocked while loading");

        feed.resolve(first, Ok(page(1, 0..20, false)))
            .expect("page must apply");
        assert!(feed.load_more().is_none(), "no more pages");
    }

    #[test]
    fn load_more_keeps_current_epoch() {
        let mut feed = FeedController::default();
        let first = feed.reload();
        feed.resolve(first, Ok(page(1, 0..20, true)))
            .expect("page must apply");

        let more = feed.load_more().expect("next page must be requested");
        assert_eq!(more.epoch(), feed.epoch());
        assert_eq!(more.query().page, 2);
        assert_eq!(more.kind(), FetchKind::Append);
    }

    #[test]
    fn refresh_keeps_items_until_response() {
        let mut feed = FeedController::default();
        let first = feed.reload();
        feed.resolve(first, Ok(page(1, 0..3, true)))
            .expect("page must apply");

        let refresh = feed.refresh();
        assert_eq!(feed.status(), FeedStatus::Refreshing);
        assert_eq!(feed.items().len(), 3);

        feed.resolve(refresh, Ok(page(1, 10..12, false)))
            .expect("refresh must apply");
        let ids: Vec<i64> = feed.items().iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![10, 11]);
    }

    #[test]
    fn failed_load_more_keeps_items() {
        let mut feed = FeedController::default();
        let first = feed.reload();
        feed.resolve(first, Ok(page(1, 0..20, true)))
            .expect("page must apply");

        let more = feed.load_more().expect("next page must be requested");
        let err = feed
            .resolve(more, Err(GatewayError::Unreachable("offline".to_string())))
            .expect_err("failure must surface");

        assert!(matches!(err, GatewayError::Unreachable(_)));
        assert_eq!(feed.items().len(), 20);
        assert_eq!(feed.page(), 1);
        assert_eq!(feed.status(), FeedStatus::Idle);
        assert!(feed.load_more().is_some(), "retry is possible");
    }

    #[test]
    fn stale_failure_does_not_touch_status() {
        let mut feed = FeedController::default();
        let old = feed.reload();
        let _current = feed.refresh();

        let resolution = feed
            .resolve(old, Err(GatewayError::Unreachable("timeout".to_string())))
            .expect("stale failure is swallowed");
        assert_eq!(resolution, Resolution::Stale);
        assert_eq!(feed.status(), FeedStatus::Refreshing);
    }

    #[test]
    fn update_like_count_changes_matching_item() {
        let mut feed = FeedController::default();
        let first = feed.reload();
        feed.resolve(first, Ok(page(1, 0..3, false)))
            .expect("page must apply");

        assert!(feed.update_like_count(2, 9));
        assert!(!feed.update_like_count(42, 1));
        assert_eq!(feed.items()[2].likes, 9);
    }
}
