//! Признак «устройство в сети», который хост передаёт в клиент.

use tokio::sync::watch;

/// Создаёт источник и наблюдателя признака сети.
///
/// Источник держит хост (обработчик системных событий сети), наблюдатель
/// передаётся в `RequestGateway`.
pub fn channel(online: bool) -> (ConnectivityHandle, Connectivity) {
    let (tx, rx) = watch::channel(online);
    (ConnectivityHandle { tx }, Connectivity { rx })
}

#[derive(Debug)]
/// Сторона, которая сообщает о смене состояния сети.
pub struct ConnectivityHandle {
    tx: watch::Sender<bool>,
}

impl ConnectivityHandle {
    /// Публикует новое состояние сети.
    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }
}

#[derive(Debug, Clone)]
/// Наблюдатель признака «устройство в сети».
pub struct Connectivity {
    rx: watch::Receiver<bool>,
}

impl Connectivity {
    /// Последнее известное состояние сети.
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Ждёт следующей смены состояния и возвращает его.
    ///
    /// `None`, если источник удалён.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}
