use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

/// Supplies the set of keys whose sessions are currently active. The cache
/// treats the result as an opaque snapshot; it may be stale by the time it
/// is used, which only delays an eviction to the next sweep.
pub trait ActiveSessions: Send + Sync {
    fn active_keys(&self) -> HashSet<Uuid>;
}

/// Metadata for one live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub name: String,
    pub address: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// Tracks which players are connected. The host glue calls [`connect`] and
/// [`disconnect`] from its join and quit handlers; everything else reads.
///
/// [`connect`]: SessionTracker::connect
/// [`disconnect`]: SessionTracker::disconnect
#[derive(Default)]
pub struct SessionTracker {
    online: RwLock<HashMap<Uuid, SessionInfo>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, key: Uuid, name: impl Into<String>, address: Option<String>) {
        let info = SessionInfo {
            name: name.into(),
            address,
            connected_at: Utc::now(),
        };
        info!(key = %key, name = %info.name, "session opened");
        self.online.write().insert(key, info);
    }

    pub fn disconnect(&self, key: Uuid) -> Option<SessionInfo> {
        let info = self.online.write().remove(&key);
        if info.is_some() {
            info!(key = %key, "session closed");
        }
        info
    }

    pub fn is_online(&self, key: Uuid) -> bool {
        self.online.read().contains_key(&key)
    }

    pub fn online_count(&self) -> usize {
        self.online.read().len()
    }

    pub fn get(&self, key: Uuid) -> Option<SessionInfo> {
        self.online.read().get(&key).cloned()
    }

    /// Case-insensitive reverse lookup by player name.
    pub fn find_by_name(&self, name: &str) -> Option<(Uuid, SessionInfo)> {
        let name = name.to_lowercase();
        self.online
            .read()
            .iter()
            .find(|(_, info)| info.name.to_lowercase() == name)
            .map(|(key, info)| (*key, info.clone()))
    }
}

impl ActiveSessions for SessionTracker {
    fn active_keys(&self) -> HashSet<Uuid> {
        self.online.read().keys().copied().collect()
    }
}
