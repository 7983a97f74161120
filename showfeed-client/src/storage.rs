use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Простое key-value хранилище строк, на котором живёт сессия.
///
/// Аналог `localStorage`/`AsyncStorage`: get/set/remove без транзакций.
/// `replace` применяет несколько изменений разом; реализации, которые
/// умеют делать это атомарно, переопределяют его.
pub trait KeyValueStore: Send + Sync {
    /// Возвращает значение по ключу.
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    /// Записывает значение.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Удаляет ключ; отсутствие ключа не ошибка.
    fn remove(&self, key: &str) -> io::Result<()>;

    /// Применяет пачку изменений: `Some` записывает, `None` удаляет.
    fn replace(&self, entries: &[(&str, Option<&str>)]) -> io::Result<()> {
        for (key, value) in entries {
            match value {
                Some(value) => self.set(key, value)?,
                None => self.remove(key)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
/// Хранилище в памяти процесса.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Создаёт пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| io::Error::other("memory store mutex poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn replace(&self, entries: &[(&str, Option<&str>)]) -> io::Result<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            match value {
                Some(value) => map.insert(key.to_string(), value.to_string()),
                None => map.remove(*key),
            };
        }
        Ok(())
    }
}

#[derive(Debug)]
/// Хранилище в одном JSON-файле.
///
/// Каждая запись перезаписывает файл целиком через временный файл и `rename`,
/// поэтому читатель видит либо старое, либо новое содержимое.
pub struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    /// Создаёт хранилище поверх файла; файл появится при первой записи.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Путь к файлу хранилища.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> io::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let raw = serde_json::to_string_pretty(map)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)
    }

    fn update<F>(&self, edit: F) -> io::Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| io::Error::other("file store mutex poisoned"))?;
        let mut map = self.read_map()?;
        edit(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| io::Error::other("file store mutex poisoned"))?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.update(|map| {
            map.remove(key);
        })
    }

    fn replace(&self, entries: &[(&str, Option<&str>)]) -> io::Result<()> {
        self.update(|map| {
            for (key, value) in entries {
                match value {
                    Some(value) => map.insert(key.to_string(), value.to_string()),
                    None => map.remove(*key),
                };
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_replace_sets_and_removes() {
        let store = MemoryStore::new();
        store.set("a", "1").expect("set must succeed");

        store
            .replace(&[("a", None), ("b", Some("2"))])
            .expect("replace must succeed");

        assert_eq!(store.get("a").expect("get"), None);
        assert_eq!(store.get("b").expect("get").as_deref(), Some("2"));
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        assert_eq!(store.get("authToken").expect("get on missing file"), None);

        store
            .replace(&[("user", Some("{}")), ("authToken", Some("abc"))])
            .expect("replace must succeed");

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("authToken").expect("get").as_deref(), Some("abc"));

        reopened.remove("authToken").expect("remove must succeed");
        reopened.remove("authToken").expect("second remove is a no-op");
        assert_eq!(store.get("authToken").expect("get"), None);
        assert_eq!(store.get("user").expect("get").as_deref(), Some("{}"));
    }

    #[test]
    fn file_store_reports_garbage_as_invalid_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not-json").expect("write garbage");

        let err = FileStore::new(&path).get("user").expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
