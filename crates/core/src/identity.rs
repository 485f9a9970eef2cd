//! Client and session identity — stable per-browser client id plus a session
//! id that rotates on explicit request or after an inactivity window.
//!
//! Storage failures are swallowed by design: the manager falls back to a
//! volatile in-memory id for the current process and never surfaces the error
//! to the caller.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::KeyValueStore;

/// Fixed storage key for the client id. The session key is configurable.
pub const CLIENT_ID_KEY: &str = "omni_client_id";

type ExpiryCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Persisted session state. A legacy bare-string value (just the id) is
/// accepted on load and upgraded to this record on the next write.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    id: String,
    started_at: i64,
    last_activity: i64,
}

impl SessionRecord {
    fn fresh() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: generate_session_id(now),
            started_at: now,
            last_activity: now,
        }
    }
}

fn generate_session_id(now_ms: i64) -> String {
    format!("session-{}-{}", now_ms, base36_suffix(9))
}

fn base36_suffix(len: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Manages the session lifecycle against the host's key-value store.
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    timeout_ms: u64,
    current: Mutex<SessionRecord>,
    on_expired: Mutex<Option<ExpiryCallback>>,
}

impl SessionManager {
    /// Load the stored session, rotating it when the inactivity window has
    /// already elapsed. A missing, unreadable, or corrupt record yields a
    /// fresh session without error.
    pub fn new(store: Arc<dyn KeyValueStore>, storage_key: impl Into<String>, timeout_ms: u64) -> Self {
        let storage_key = storage_key.into();
        let now = Utc::now().timestamp_millis();

        let loaded = match store.get(&storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<SessionRecord>(&raw) {
                Ok(record) => Some(record),
                // Legacy format stored the bare id.
                Err(_) => Some(SessionRecord {
                    id: raw,
                    started_at: now,
                    last_activity: now,
                }),
            },
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "session store unreadable, using volatile session");
                None
            }
        };

        let current = match loaded {
            Some(record) if !is_expired(&record, now, timeout_ms) => record,
            _ => SessionRecord::fresh(),
        };

        let manager = Self {
            store,
            storage_key,
            timeout_ms,
            current: Mutex::new(current),
            on_expired: Mutex::new(None),
        };
        manager.persist();
        manager
    }

    /// The current session identifier.
    pub fn session_id(&self) -> String {
        self.current
            .lock()
            .expect("session mutex poisoned")
            .id
            .clone()
    }

    /// Generate, persist, and return a fresh session id.
    pub fn start_new_session(&self) -> String {
        let record = SessionRecord::fresh();
        let id = record.id.clone();
        *self.current.lock().expect("session mutex poisoned") = record;
        self.persist();
        debug!(session_id = %id, "started new session");
        id
    }

    /// Remove the stored session record. The in-memory id stays valid until
    /// rotation, so in-flight events keep a consistent session.
    pub fn clear_session(&self) {
        if let Err(e) = self.store.remove(&self.storage_key) {
            debug!(error = %e, "failed to clear stored session");
        }
    }

    /// Refresh the last-activity timestamp.
    pub fn update_activity(&self) {
        self.current
            .lock()
            .expect("session mutex poisoned")
            .last_activity = Utc::now().timestamp_millis();
        self.persist();
    }

    /// Rotate the session when the inactivity window has elapsed. Called
    /// opportunistically by the tracker on each event. Returns whether a
    /// rotation happened.
    pub fn check_session_expired(&self) -> bool {
        let now = Utc::now().timestamp_millis();
        let expired_id = {
            let mut current = self.current.lock().expect("session mutex poisoned");
            if !is_expired(&current, now, self.timeout_ms) {
                return false;
            }
            let expired = current.id.clone();
            *current = SessionRecord::fresh();
            expired
        };
        self.persist();

        let callback = self
            .on_expired
            .lock()
            .expect("session mutex poisoned")
            .clone();
        if let Some(callback) = callback {
            callback(&expired_id);
        }
        debug!(expired_session = %expired_id, "session rotated after inactivity");
        true
    }

    /// Register a callback invoked with the expired session id on rotation.
    pub fn on_session_expired(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_expired.lock().expect("session mutex poisoned") = Some(Arc::new(callback));
    }

    /// Client id persisted under its own fixed key; rotates only on explicit
    /// caller request.
    pub fn load_client_id(&self) -> Option<String> {
        match self.store.get(CLIENT_ID_KEY) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "client id store unreadable");
                None
            }
        }
    }

    pub fn persist_client_id(&self, id: &str) {
        if let Err(e) = self.store.set(CLIENT_ID_KEY, id) {
            debug!(error = %e, "failed to persist client id");
        }
    }

    fn persist(&self) {
        let raw = {
            let current = self.current.lock().expect("session mutex poisoned");
            serde_json::to_string(&*current)
        };
        match raw {
            Ok(raw) => {
                if let Err(e) = self.store.set(&self.storage_key, &raw) {
                    debug!(error = %e, "failed to persist session, continuing in memory");
                }
            }
            Err(e) => debug!(error = %e, "failed to encode session record"),
        }
    }
}

fn is_expired(record: &SessionRecord, now_ms: i64, timeout_ms: u64) -> bool {
    now_ms.saturating_sub(record.last_activity) > timeout_ms as i64
}
