use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{SessionError, SessionResult};
use crate::models::UserIdentity;
use crate::storage::{KeyValueStore, MemoryStore};

/// Ключ записи с сериализованным пользователем.
pub const USER_KEY: &str = "user";
/// Ключ записи с токеном авторизации.
pub const TOKEN_KEY: &str = "authToken";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Сессия клиента: пользователь и токен.
///
/// Токен без пользователя не допускается; пользователь без токена допустим
/// (сервер может не выдавать токен при входе).
pub struct Session {
    user: Option<UserIdentity>,
    credential: Option<String>,
}

impl Session {
    /// Создаёт сессию, проверяя инвариант «есть токен ⇒ есть пользователь».
    ///
    /// Пустой токен считается отсутствующим.
    pub fn new(user: Option<UserIdentity>, credential: Option<String>) -> SessionResult<Self> {
        let credential = credential.as_deref().and_then(parse_token);
        if credential.is_some() && user.is_none() {
            return Err(SessionError::Invalid("credential without user"));
        }
        Ok(Self { user, credential })
    }

    /// Сессия вошедшего пользователя с токеном.
    pub fn authenticated(user: UserIdentity, credential: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            credential: parse_token(&credential.into()),
        }
    }

    /// Сессия пользователя без токена.
    pub fn without_credential(user: UserIdentity) -> Self {
        Self {
            user: Some(user),
            credential: None,
        }
    }

    /// Текущий пользователь.
    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Токен авторизации.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// `true`, если нет ни пользователя, ни токена.
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.credential.is_none()
    }
}

fn parse_token(raw: &str) -> Option<String> {
    let token = raw.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Событие сброса сессии после ответа 401.
pub struct Invalidation {
    /// Пользователь, который был в сессии на момент сброса.
    pub user: Option<UserIdentity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Идентификатор подписки на сброс сессии.
pub struct ListenerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Токен и поколение сессии на момент отправки запроса.
pub struct CredentialSnapshot {
    generation: u64,
    credential: Option<String>,
}

impl CredentialSnapshot {
    /// Поколение сессии.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Токен, который нужно приложить к запросу.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }
}

type Listener = Arc<dyn Fn(&Invalidation) + Send + Sync>;

/// Хранилище сессии поверх [`KeyValueStore`].
///
/// Каждый `save`/`clear` увеличивает поколение; `update_user` токен не
/// трогает и поколение не меняет. `invalidate` сбрасывает
/// сессию только если поколение не изменилось с момента снимка, поэтому
/// несколько одновременных ответов 401 дают одно уведомление, а запоздавший
/// 401 не стирает сессию, сохранённую после нового входа.
pub struct SessionStore {
    backend: Box<dyn KeyValueStore>,
    generation: Mutex<u64>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("generation", &*self.lock_generation())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Создаёт хранилище сессии поверх переданного backend.
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            generation: Mutex::new(0),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Хранилище сессии в памяти.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Читает сессию, возвращая ошибку чтения или разбора.
    pub fn try_load(&self) -> SessionResult<Session> {
        let _generation = self.lock_generation();
        self.read_session()
    }

    /// Читает сессию; при любой ошибке возвращает пустую сессию и пишет warn.
    pub fn load(&self) -> Session {
        self.try_load().unwrap_or_else(|err| {
            warn!(error = %err, "failed to load session, continuing as anonymous");
            Session::default()
        })
    }

    /// Атомарно заменяет сохранённую сессию.
    pub fn save(&self, session: &Session) -> SessionResult<()> {
        let user = session
            .user
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| SessionError::Corrupt {
                key: USER_KEY,
                source,
            })?;

        let mut generation = self.lock_generation();
        self.backend.replace(&[
            (USER_KEY, user.as_deref()),
            (TOKEN_KEY, session.credential.as_deref()),
        ])?;
        *generation += 1;
        Ok(())
    }

    /// Удаляет сохранённую сессию. Повторный вызов ничего не меняет.
    pub fn clear(&self) -> SessionResult<()> {
        let mut generation = self.lock_generation();
        self.backend.replace(&[(USER_KEY, None), (TOKEN_KEY, None)])?;
        *generation += 1;
        Ok(())
    }

    /// Изменяет сохранённого пользователя, сохраняя токен.
    ///
    /// Возвращает `None`, если пользователь не сохранён.
    pub fn update_user<F>(&self, edit: F) -> SessionResult<Option<UserIdentity>>
    where
        F: FnOnce(&mut UserIdentity),
    {
        let _generation = self.lock_generation();
        let mut session = self.read_session()?;
        let Some(user) = session.user.as_mut() else {
            return Ok(None);
        };
        edit(user);

        let raw = serde_json::to_string(&*user).map_err(|source| SessionError::Corrupt {
            key: USER_KEY,
            source,
        })?;
        // Токен не меняется, поэтому поколение остаётся прежним.
        self.backend.set(USER_KEY, &raw)?;
        Ok(session.user)
    }

    /// Подписывает обработчик на сброс сессии.
    pub fn on_invalidated<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Invalidation) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Отписывает обработчик. Возвращает `false`, если такой подписки нет.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Текущее поколение сессии.
    pub fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    /// Снимок токена для исходящего запроса.
    ///
    /// Токен берётся только из целой сессии: токен без пользователя или рядом
    /// с повреждённой записью пользователя не отправляется, а осиротевший
    /// токен удаляется из хранилища.
    pub fn snapshot(&self) -> CredentialSnapshot {
        let generation = self.lock_generation();
        let credential = match self.read_session() {
            Ok(session) => session.credential,
            Err(SessionError::Invalid(reason)) => {
                warn!(reason, "dropping orphan credential");
                if let Err(err) = self.backend.remove(TOKEN_KEY) {
                    warn!(error = %err, "failed to remove orphan credential");
                }
                None
            }
            Err(err) => {
                warn!(error = %err, "failed to read session, sending request unauthenticated");
                None
            }
        };

        CredentialSnapshot {
            generation: *generation,
            credential,
        }
    }

    /// Сбрасывает сессию после отказа в авторизации.
    ///
    /// Срабатывает только если с момента снимка `seen_generation` сессию
    /// никто не менял. Возвращает `true`, если сессия была сброшена и
    /// подписчики уведомлены.
    pub fn invalidate(&self, seen_generation: u64) -> bool {
        let event = {
            let mut generation = self.lock_generation();
            if *generation != seen_generation {
                debug!(
                    seen_generation,
                    current_generation = *generation,
                    "session already replaced, skipping invalidation"
                );
                return false;
            }

            let user = self.read_session().ok().and_then(|session| session.user);
            if let Err(err) = self.backend.replace(&[(USER_KEY, None), (TOKEN_KEY, None)]) {
                warn!(error = %err, "failed to clear invalidated session");
            }
            *generation += 1;
            Invalidation { user }
        };

        info!(
            username = event.user.as_ref().map(|u| u.username.as_str()),
            "session invalidated by server"
        );
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
        true
    }

    fn read_session(&self) -> SessionResult<Session> {
        let credential = self.backend.get(TOKEN_KEY)?.as_deref().and_then(parse_token);
        let user = self
            .backend
            .get(USER_KEY)?
            .map(|raw| serde_json::from_str::<UserIdentity>(&raw))
            .transpose()
            .map_err(|source| SessionError::Corrupt {
                key: USER_KEY,
                source,
            })?;

        if credential.is_some() && user.is_none() {
            return Err(SessionError::Invalid("stored credential has no user"));
        }
        Ok(Session { user, credential })
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sample_user() -> UserIdentity {
        UserIdentity {
            id: 1,
            username: "dancer".to_string(),
            display_name: "Dancer".to_string(),
            email: "dancer@example.com".to_string(),
            phone: None,
            is_admin: false,
            created_at: None,
        }
    }

    fn store_with(entries: &[(&str, &str)]) -> SessionStore {
        let backend = MemoryStore::new();
        for (key, value) in entries {
            backend.set(key, value).expect("seed must succeed");
        }
        SessionStore::new(backend)
    }

    #[test]
    fn session_rejects_credential_without_user() {
        let err = Session::new(None, Some("token".to_string())).expect_err("must fail");
        assert!(matches!(err, SessionError::Invalid(_)));

        let session = Session::new(None, Some("   ".to_string())).expect("blank token is absent");
        assert!(session.is_empty());
    }

    #[test]
    fn load_on_empty_store_returns_empty_session() {
        let store = SessionStore::in_memory();
        assert!(store.load().is_empty());
    }

    #[test]
    fn save_then_load_returns_new_value() {
        let store = SessionStore::in_memory();
        let session = Session::authenticated(sample_user(), "abc");
        store.save(&session).expect("save must succeed");
        assert_eq!(store.load(), session);

        let session = Session::without_credential(sample_user());
        store.save(&session).expect("save must succeed");
        let loaded = store.load();
        assert_eq!(loaded.user(), Some(&sample_user()));
        assert_eq!(loaded.credential(), None);
    }

    #[test]
    fn load_is_soft_on_corrupt_user_record() {
        let store = store_with(&[(USER_KEY, "{not-json}")]);
        assert!(store.try_load().is_err());
        assert!(store.load().is_empty());
    }

    #[test]
    fn load_drops_orphan_credential() {
        let store = store_with(&[(TOKEN_KEY, "abc")]);
        assert!(matches!(store.try_load(), Err(SessionError::Invalid(_))));
        assert!(store.load().is_empty());
    }

    #[test]
    fn clear_is_idempotent() {
        let store = SessionStore::in_memory();
        store
            .save(&Session::authenticated(sample_user(), "abc"))
            .expect("save must succeed");
        store.clear().expect("clear must succeed");
        store.clear().expect("second clear must succeed");
        assert!(store.load().is_empty());
    }

    #[test]
    fn invalidate_fires_once_per_generation() {
        let store = SessionStore::in_memory();
        store
            .save(&Session::authenticated(sample_user(), "abc"))
            .expect("save must succeed");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        store.on_invalidated(move |event| {
            assert_eq!(event.user.as_ref().map(|u| u.id), Some(1));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = store.snapshot();
        let second = store.snapshot();
        assert_eq!(first.credential(), Some("abc"));

        assert!(store.invalidate(first.generation()));
        assert!(!store.invalidate(second.generation()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(store.load().is_empty());
    }

    #[test]
    fn invalidate_keeps_session_saved_after_snapshot() {
        let store = SessionStore::in_memory();
        let stale = store.snapshot();

        let fresh = Session::authenticated(sample_user(), "fresh");
        store.save(&fresh).expect("save must succeed");

        assert!(!store.invalidate(stale.generation()));
        assert_eq!(store.load(), fresh);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let store = SessionStore::in_memory();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let id = store.on_invalidated(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.remove_listener(id));
        assert!(!store.remove_listener(id));
        assert!(store.invalidate(store.generation()));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn profile_edit_does_not_block_invalidation() {
        let store = SessionStore::in_memory();
        store
            .save(&Session::authenticated(sample_user(), "rejected"))
            .expect("save must succeed");

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        store.on_invalidated(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let in_flight = store.snapshot();
        store
            .update_user(|user| user.display_name = "Renamed".to_string())
            .expect("update must succeed");

        assert!(store.invalidate(in_flight.generation()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(store.load().is_empty());
    }

    #[test]
    fn snapshot_skips_credential_without_user() {
        let store = store_with(&[(TOKEN_KEY, "orphan")]);
        assert_eq!(store.snapshot().credential(), None);
        assert_eq!(store.backend.get(TOKEN_KEY).expect("get"), None);

        let store = store_with(&[(USER_KEY, "{not-json}"), (TOKEN_KEY, "abc")]);
        assert_eq!(store.snapshot().credential(), None);
    }

    #[test]
    fn update_user_keeps_credential() {
        let store = SessionStore::in_memory();
        assert_eq!(store.update_user(|_| {}).expect("no user is fine"), None);

        store
            .save(&Session::authenticated(sample_user(), "abc"))
            .expect("save must succeed");
        let updated = store
            .update_user(|user| user.phone = Some("010-0000-0000".to_string()))
            .expect("update must succeed")
            .expect("user must exist");
        assert_eq!(updated.phone.as_deref(), Some("010-0000-0000"));

        let loaded = store.load();
        assert_eq!(loaded.credential(), Some("abc"));
        assert_eq!(loaded.user(), Some(&updated));
    }
}
