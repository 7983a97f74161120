use std::collections::HashSet;

use tracing::{debug, warn};

use crate::api::PerformanceSource;
use crate::error::GatewayResult;
use crate::models::{EventDetail, LikeOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Оптимистичное переключение лайка, ожидающее ответа сервера.
pub struct PendingLike {
    event_id: i64,
    previous_liked: bool,
    previous_likes: u64,
}

impl PendingLike {
    /// Событие, для которого отправлен запрос.
    pub fn event_id(&self) -> i64 {
        self.event_id
    }
}

#[derive(Debug, Default)]
/// Переключатель лайков с оптимистичным обновлением.
///
/// Пока по событию есть запрос в полёте, повторные нажатия игнорируются.
pub struct LikeToggle {
    pending: HashSet<i64>,
}

impl LikeToggle {
    /// Создаёт переключатель без запросов в полёте.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true`, если по событию ждём ответа сервера; кнопку стоит выключить.
    pub fn is_pending(&self, event_id: i64) -> bool {
        self.pending.contains(&event_id)
    }

    /// Меняет лайк локально. `None`, если по этому событию уже идёт запрос.
    pub fn begin(&mut self, detail: &mut EventDetail) -> Option<PendingLike> {
        let event_id = detail.id();
        if !self.pending.insert(event_id) {
            debug!(event_id, "like toggle already in flight, ignoring");
            return None;
        }

        let pending = PendingLike {
            event_id,
            previous_liked: detail.liked_by_me,
            previous_likes: detail.summary.likes,
        };

        detail.liked_by_me = !detail.liked_by_me;
        detail.summary.likes = if detail.liked_by_me {
            detail.summary.likes.saturating_add(1)
        } else {
            detail.summary.likes.saturating_sub(1)
        };
        Some(pending)
    }

    /// Сверяет локальное состояние с ответом сервера.
    ///
    /// Успех перезаписывает число лайков значением сервера; ошибка
    /// возвращает оба поля к значениям до нажатия.
    pub fn finish(
        &mut self,
        detail: &mut EventDetail,
        pending: PendingLike,
        outcome: GatewayResult<LikeOutcome>,
    ) -> GatewayResult<LikeOutcome> {
        self.pending.remove(&pending.event_id);
        if detail.id() != pending.event_id {
            warn!(
                expected = pending.event_id,
                actual = detail.id(),
                "like result applied to another event, ignoring"
            );
            return outcome;
        }

        match outcome {
            Ok(outcome) => {
                detail.summary.likes = outcome.likes_count;
                Ok(outcome)
            }
            Err(err) => {
                warn!(event_id = pending.event_id, error = %err, "like toggle failed, reverting");
                detail.liked_by_me = pending.previous_liked;
                detail.summary.likes = pending.previous_likes;
                Err(err)
            }
        }
    }

    /// Переключает лайк целиком: локально, на сервере и обратно.
    ///
    /// `Ok(None)`, если нажатие проигнорировано.
    pub async fn toggle<S>(
        &mut self,
        source: &S,
        detail: &mut EventDetail,
    ) -> GatewayResult<Option<LikeOutcome>>
    where
        S: PerformanceSource + ?Sized,
    {
        let Some(pending) = self.begin(detail) else {
            return Ok(None);
        };
        let outcome = source.toggle_like(pending.event_id).await;
        self.finish(detail, pending, outcome).map(Some)
    }
}
