use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::protocol::PushEvent;

pub const ROOM_CAPACITY: usize = 64;

/// Per-user broadcast rooms.
///
/// Every live connection for a user subscribes to that user's room; the
/// telemetry loop and the add-plant handler publish into it. A room is
/// created on first subscribe and dropped once its last receiver is gone.
#[derive(Clone, Default)]
pub struct Broker {
    rooms: Arc<Mutex<HashMap<i64, broadcast::Sender<PushEvent>>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: i64) -> broadcast::Receiver<PushEvent> {
        let mut rooms = self.rooms.lock();
        rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Publish to a user's room. Returns how many receivers got the event;
    /// zero when nobody is listening.
    pub fn publish(&self, user_id: i64, event: PushEvent) -> usize {
        let rooms = self.rooms.lock();
        match rooms.get(&user_id) {
            // Ignore error - means no receivers
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the room if no receivers remain.
    pub fn prune(&self, user_id: i64) {
        let mut rooms = self.rooms.lock();
        if rooms.get(&user_id).is_some_and(|tx| tx.receiver_count() == 0) {
            rooms.remove(&user_id);
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}
