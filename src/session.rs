use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "greenhouse_session";

/// Maximum number of live browser sessions kept in memory.
const MAX_SESSIONS: usize = 10_000;

/// What the server knows about one browser session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionData {
    /// Authenticated user, if logged in.
    pub user_id: Option<i64>,
    /// Whether fault injection is active for this session.
    pub error_mode: bool,
}

#[derive(Debug)]
struct Entry {
    data: SessionData,
    last_seen: Instant,
}

/// Server-side session store keyed by the opaque cookie value.
///
/// Sessions idle for longer than the TTL are pruned whenever a new one is
/// created. Process restart forgets every session.
#[derive(Debug)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Mint a fresh anonymous session and return its id.
    pub fn create(&self) -> String {
        let mut map = self.inner.lock();

        let now = Instant::now();
        let ttl = self.ttl;
        map.retain(|_, e| now.duration_since(e.last_seen) < ttl);

        if map.len() >= MAX_SESSIONS {
            // Evict the stalest session to make room.
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(id, _)| id.clone())
            {
                map.remove(&oldest);
            }
        }

        let id = Uuid::new_v4().simple().to_string();
        map.insert(
            id.clone(),
            Entry {
                data: SessionData::default(),
                last_seen: now,
            },
        );
        id
    }

    /// Look up a live session and refresh its idle timer.
    pub fn get(&self, id: &str) -> Option<SessionData> {
        let mut map = self.inner.lock();
        let now = Instant::now();
        match map.get_mut(id) {
            Some(entry) if now.duration_since(entry.last_seen) < self.ttl => {
                entry.last_seen = now;
                Some(entry.data)
            }
            Some(_) => {
                map.remove(id);
                None
            }
            None => None,
        }
    }

    /// Apply `f` to a session's data and return the updated copy.
    pub fn update<F>(&self, id: &str, f: F) -> Option<SessionData>
    where
        F: FnOnce(&mut SessionData),
    {
        let mut map = self.inner.lock();
        let entry = map.get_mut(id)?;
        f(&mut entry.data);
        entry.last_seen = Instant::now();
        Some(entry.data)
    }

    pub fn set_user(&self, id: &str, user_id: Option<i64>) -> Option<SessionData> {
        self.update(id, |data| data.user_id = user_id)
    }

    /// Flip the error-mode flag and return its new value.
    pub fn toggle_error_mode(&self, id: &str) -> Option<bool> {
        self.update(id, |data| data.error_mode = !data.error_mode)
            .map(|data| data.error_mode)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract the session id from a `Cookie` header value.
pub fn session_id_from_cookie(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
    })
}

/// `Set-Cookie` value for a freshly minted session.
pub fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}
