use thiserror::Error;

const GENERIC_FAILURE: &str = "request failed, please try again";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Ошибки удалённых вызовов, прошедших через `RequestGateway`.
pub enum GatewayError {
    /// Сервер недоступен: сетевая ошибка, таймаут или устройство офлайн.
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// Сервер отклонил запрос (не-2xx статус или тело с `success: false`).
    #[error("request rejected: {}", .message.as_deref().unwrap_or("no details"))]
    Rejected {
        /// HTTP-статус ответа; `None`, если статус был 2xx, а отказ пришёл в теле.
        status: Option<u16>,
        /// Сообщение сервера из поля `error` или `message`.
        message: Option<String>,
    },

    /// Ответ 401: сессия сброшена, подписчики уведомлены.
    #[error("unauthorized")]
    Unauthorized {
        /// Сообщение сервера, если оно было в теле ответа.
        message: Option<String>,
    },

    /// Успешный ответ, который не удалось разобрать.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Результат удалённых вызовов.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub(crate) fn from_http_status(status: reqwest::StatusCode, message: Option<String>) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Self::Unauthorized { message },
            _ => Self::Rejected {
                status: Some(status.as_u16()),
                message,
            },
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        if err.is_timeout() {
            return Self::Unreachable("request timed out".to_string());
        }
        Self::Unreachable(err.to_string())
    }

    /// Сообщение сервера, если ответ его содержал.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } | Self::Unauthorized { message } => message.as_deref(),
            Self::Unreachable(_) | Self::InvalidResponse(_) => None,
        }
    }

    /// Текст для показа пользователю: сообщение сервера дословно, иначе общий текст.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreachable(_) => "server is unreachable, check your connection".to_string(),
            Self::Unauthorized { .. } => "session expired, please log in again".to_string(),
            Self::Rejected { .. } | Self::InvalidResponse(_) => self
                .server_message()
                .unwrap_or(GENERIC_FAILURE)
                .to_string(),
        }
    }
}

#[derive(Debug, Error)]
/// Ошибки локального хранилища сессии.
pub enum SessionError {
    /// Ошибка ввода-вывода хранилища.
    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Запись в хранилище не разбирается как JSON.
    #[error("corrupt session record '{key}': {source}")]
    Corrupt {
        /// Ключ повреждённой записи.
        key: &'static str,
        /// Ошибка разбора.
        #[source]
        source: serde_json::Error,
    },

    /// Сессия нарушает инвариант «есть токен ⇒ есть пользователь».
    #[error("invalid session: {0}")]
    Invalid(&'static str),
}

/// Результат операций хранилища сессии.
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `showfeed-client`.
pub enum ClientError {
    /// Ошибка удалённого вызова.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Ошибка хранилища сессии.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Данные формы не прошли валидацию.
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Вход или регистрация отклонены; сообщение готово для показа.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Не удалось собрать HTTP-клиент.
    #[error("failed to build http client: {0}")]
    Setup(String),
}

/// Результат операций `showfeed-client`.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn unauthorized_status_maps_to_unauthorized() {
        let err = GatewayError::from_http_status(StatusCode::UNAUTHORIZED, Some("expired".into()));
        assert_eq!(
            err,
            GatewayError::Unauthorized {
                message: Some("expired".to_string())
            }
        );
    }

    #[test]
    fn forbidden_is_rejected_not_unauthorized() {
        let err = GatewayError::from_http_status(StatusCode::FORBIDDEN, None);
        assert_eq!(
            err,
            GatewayError::Rejected {
                status: Some(403),
                message: None
            }
        );
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = GatewayError::Rejected {
            status: Some(400),
            message: Some("username already taken".to_string()),
        };
        assert_eq!(err.user_message(), "username already taken");

        let err = GatewayError::Rejected {
            status: Some(500),
            message: None,
        };
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }

    #[test]
    fn rejected_display_includes_message() {
        let err = GatewayError::Rejected {
            status: Some(404),
            message: Some("not found".to_string()),
        };
        assert_eq!(err.to_string(), "request rejected: not found");
    }
}
