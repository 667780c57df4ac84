use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::broker::Broker;
use crate::protocol::PushEvent;

/// Registry state for one connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub error_mode: bool,
}

/// Connection lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { user_id: i64, error_mode: bool },
    Disconnected { user_id: i64 },
}

/// Tracks which users currently hold a live push channel.
///
/// Created once at process start and shared by the websocket handlers
/// (writers) and the telemetry loop (reader). Keyed by user id, so a second
/// connection for the same user overwrites the first entry; the rooms in
/// the [`Broker`] still fan out to every open connection.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<i64, ConnectionEntry>>>,
    broker: Broker,
    events_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionRegistry {
    pub fn new(broker: Broker) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            broker,
            events_tx,
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Insert or overwrite the entry for `user_id` and subscribe the caller to
    /// the user's room.
    pub fn register(&self, user_id: i64, error_mode: bool) -> broadcast::Receiver<PushEvent> {
        let rx = self.broker.subscribe(user_id);
        let previous = self
            .inner
            .write()
            .insert(user_id, ConnectionEntry { error_mode });
        if previous.is_some() {
            tracing::debug!(user_id, "replacing existing registry entry");
        }
        let _ = self.events_tx.send(ConnectionEvent::Connected {
            user_id,
            error_mode,
        });
        rx
    }

    /// Remove the entry for `user_id`. No-op if absent.
    pub fn unregister(&self, user_id: i64) -> Option<ConnectionEntry> {
        let removed = self.inner.write().remove(&user_id);
        self.broker.prune(user_id);
        if removed.is_some() {
            let _ = self.events_tx.send(ConnectionEvent::Disconnected { user_id });
        }
        removed
    }

    /// Point-in-time copy of every entry, safe to iterate while handlers
    /// keep mutating the registry.
    pub fn snapshot(&self) -> Vec<(i64, ConnectionEntry)> {
        let inner = self.inner.read();
        inner.iter().map(|(id, entry)| (*id, *entry)).collect()
    }

    pub fn get(&self, user_id: i64) -> Option<ConnectionEntry> {
        self.inner.read().get(&user_id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }
}
