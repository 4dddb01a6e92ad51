use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use lru::LruCache;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{session::ActiveSessions, store::RecordStore, Result};

/// A live record. The cache hands out `Arc`s of this; at most one instance
/// exists per key at a time.
pub struct RecordHandle<T> {
    key: Uuid,
    data: RwLock<T>,
    dirty: AtomicBool,
}

impl<T> RecordHandle<T> {
    fn new(key: Uuid, data: T, dirty: bool) -> Self {
        Self {
            key,
            data: RwLock::new(data),
            dirty: AtomicBool::new(dirty),
        }
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.data.read()
    }

    /// Mutable access. Marks the record dirty.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.dirty.store(true, Ordering::SeqCst);
        self.data.write()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

/// Hot/cold entry counts, mostly for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hot: usize,
    pub cold: usize,
}

/// Two-tier cache over a [`RecordStore`].
///
/// Hot entries belong to active sessions and are held strongly. A hot entry
/// whose session has ended is demoted: saved to disk first, then parked in a
/// bounded LRU cold tier so a quick rejoin does not reload from disk. A key
/// lives in at most one tier.
///
/// The tier maps are locked only for the map operation itself; disk I/O
/// always happens outside the locks. Lock order is hot before cold.
pub struct VaultCache<T> {
    store: RecordStore<T>,
    sessions: Arc<dyn ActiveSessions>,
    hot: Mutex<HashMap<Uuid, Arc<RecordHandle<T>>>>,
    cold: Mutex<LruCache<Uuid, Arc<RecordHandle<T>>>>,
}

impl<T> VaultCache<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    pub fn new(
        store: RecordStore<T>,
        sessions: Arc<dyn ActiveSessions>,
        cold_capacity: NonZeroUsize,
    ) -> Self {
        Self {
            store,
            sessions,
            hot: Mutex::new(HashMap::new()),
            cold: Mutex::new(LruCache::new(cold_capacity)),
        }
    }

    pub fn store(&self) -> &RecordStore<T> {
        &self.store
    }

    /// Fetch the record for `key`, loading it if no live instance exists.
    ///
    /// A missing file yields a default record. I/O and parse failures are
    /// returned to the caller, who decides whether to fall back; batch
    /// operations never see them.
    pub async fn get(&self, key: Uuid) -> Result<Arc<RecordHandle<T>>> {
        if let Some(handle) = self.lookup(key) {
            return Ok(handle);
        }

        // Miss. Load outside any lock, then insert-if-absent: a racing
        // loader's copy is dropped here before anyone can observe it.
        let loaded = self.store.load(key).await?;
        let fresh = loaded.is_none();
        let handle = Arc::new(RecordHandle::new(key, loaded.unwrap_or_default(), fresh));

        let mut hot = self.hot.lock();
        if let Some(existing) = hot.get(&key) {
            return Ok(Arc::clone(existing));
        }
        if let Some(existing) = self.cold.lock().pop(&key) {
            hot.insert(key, Arc::clone(&existing));
            return Ok(existing);
        }
        hot.insert(key, Arc::clone(&handle));
        debug!(key = %key, fresh, "record loaded");
        Ok(handle)
    }

    /// Hot hit, or cold hit promoted back to hot. Map work only.
    fn lookup(&self, key: Uuid) -> Option<Arc<RecordHandle<T>>> {
        let mut hot = self.hot.lock();
        if let Some(handle) = hot.get(&key) {
            return Some(Arc::clone(handle));
        }
        if let Some(handle) = self.cold.lock().pop(&key) {
            hot.insert(key, Arc::clone(&handle));
            return Some(handle);
        }
        None
    }

    /// Persist every hot entry. A failing entry is logged and skipped; the
    /// batch always runs to completion.
    pub async fn save_all(&self) {
        let entries: Vec<_> = self.hot.lock().values().map(Arc::clone).collect();
        for handle in entries {
            if let Err(err) = self.save_handle(&handle).await {
                error!(key = %handle.key(), "could not save record: {err:?}");
            }
        }
    }

    /// Demote every hot entry whose key is not in `active`: save it, then
    /// move it to the cold tier. A failed save leaves the entry hot for the
    /// next sweep. Operates on a snapshot of the hot key list.
    pub async fn evict_except(&self, active: &HashSet<Uuid>) {
        let victims: Vec<_> = {
            let hot = self.hot.lock();
            hot.iter()
                .filter(|(key, _)| !active.contains(key))
                .map(|(key, handle)| (*key, Arc::clone(handle)))
                .collect()
        };

        for (key, handle) in victims {
            if let Err(err) = self.save_handle(&handle).await {
                error!(key = %key, "could not save record, keeping it hot: {err:?}");
                continue;
            }
            let overflow = {
                let mut hot = self.hot.lock();
                match hot.remove(&key) {
                    Some(handle) => self.cold.lock().push(key, handle),
                    // force-dropped while we were saving
                    None => None,
                }
            };
            debug!(key = %key, "record demoted");
            if let Some((old_key, old)) = overflow {
                if old_key != key && old.is_dirty() {
                    // the cold tier is full and pushed out its oldest
                    // entry with unsaved changes
                    if let Err(err) = self.save_handle(&old).await {
                        error!(key = %old_key, "could not save record dropped from cold tier: {err:?}");
                    }
                }
                debug!(key = %old_key, "cold tier dropped record");
            }
        }
    }

    /// [`Self::evict_except`] over the session tracker's current snapshot.
    pub async fn evict_inactive(&self) {
        let active = self.sessions.active_keys();
        self.evict_except(&active).await;
    }

    /// Unload `key` without saving, for when the on-disk state should win
    /// (e.g. the in-memory record is known to be bad). Runs an eviction
    /// sweep first so tier bookkeeping is settled, then removes the key from
    /// both tiers.
    pub async fn force_drop(&self, key: Uuid) {
        self.evict_inactive().await;
        self.hot.lock().remove(&key);
        self.cold.lock().pop(&key);
        warn!(key = %key, "record dropped without saving");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hot: self.hot.lock().len(),
            cold: self.cold.lock().len(),
        }
    }

    /// Serialize under the record's read lock, write outside it. The dirty
    /// flag is claimed up front and re-marked on failure, so a mutation
    /// racing the save is never lost.
    async fn save_handle(&self, handle: &RecordHandle<T>) -> Result<()> {
        handle.dirty.store(false, Ordering::SeqCst);
        let bytes = match serde_json::to_vec_pretty(&*handle.read()) {
            Ok(bytes) => bytes,
            Err(err) => {
                handle.dirty.store(true, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        if let Err(err) = self.store.write_bytes(handle.key, bytes).await {
            handle.dirty.store(true, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    #[cfg(test)]
    fn tier_of(&self, key: Uuid) -> (bool, bool) {
        (
            self.hot.lock().contains_key(&key),
            self.cold.lock().contains(&key),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionTracker;
    use serde::Deserialize;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestRecord {
        nickname: Option<String>,
        count: u32,
    }

    const IO_TIMEOUT: Duration = Duration::from_secs(5);

    fn fixture(dir: &TempDir) -> (Arc<SessionTracker>, VaultCache<TestRecord>) {
        let sessions = Arc::new(SessionTracker::new());
        let store = RecordStore::new(dir.path(), IO_TIMEOUT);
        let cache = VaultCache::new(
            store,
            Arc::clone(&sessions) as Arc<dyn ActiveSessions>,
            NonZeroUsize::new(4).unwrap(),
        );
        (sessions, cache)
    }

    #[tokio::test]
    async fn missing_record_defaults() {
        let dir = TempDir::new().unwrap();
        let (_, cache) = fixture(&dir);
        let key = Uuid::new_v4();

        let handle = cache.get(key).await.unwrap();
        assert_eq!(*handle.read(), TestRecord::default());
        assert!(handle.is_dirty());
        assert_eq!(cache.stats(), CacheStats { hot: 1, cold: 0 });
    }

    #[tokio::test]
    async fn get_returns_the_same_live_instance() {
        let dir = TempDir::new().unwrap();
        let (_, cache) = fixture(&dir);
        let key = Uuid::new_v4();

        let first = cache.get(key).await.unwrap();
        let second = cache.get(key).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn save_before_demote() {
        let dir = TempDir::new().unwrap();
        let (_, cache) = fixture(&dir);
        let key = Uuid::new_v4();

        cache
            .store()
            .save(
                key,
                &TestRecord {
                    nickname: Some("Bob".to_owned()),
                    count: 0,
                },
            )
            .await
            .unwrap();

        let handle = cache.get(key).await.unwrap();
        assert_eq!(handle.read().nickname.as_deref(), Some("Bob"));

        handle.write().nickname = Some("Bobby".to_owned());
        drop(handle);
        cache.evict_except(&HashSet::new()).await;
        assert_eq!(cache.tier_of(key), (false, true));

        // the demotion saved the mutation before parking the entry
        let on_disk = cache.store().load(key).await.unwrap().unwrap();
        assert_eq!(on_disk.nickname.as_deref(), Some("Bobby"));

        // cold hit promotes the live instance back
        let handle = cache.get(key).await.unwrap();
        assert_eq!(handle.read().nickname.as_deref(), Some("Bobby"));
        assert_eq!(cache.tier_of(key), (true, false));
    }

    #[tokio::test]
    async fn evict_spares_active_sessions() {
        let dir = TempDir::new().unwrap();
        let (sessions, cache) = fixture(&dir);
        let online = Uuid::new_v4();
        let offline = Uuid::new_v4();
        sessions.connect(online, "Alice", None);

        cache.get(online).await.unwrap();
        cache.get(offline).await.unwrap();
        cache.evict_inactive().await;

        assert_eq!(cache.tier_of(online), (true, false));
        assert_eq!(cache.tier_of(offline), (false, true));
        assert!(cache.store().load(offline).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn force_drop_discards_unsaved_mutations() {
        let dir = TempDir::new().unwrap();
        let (sessions, cache) = fixture(&dir);
        let key = Uuid::new_v4();
        // keep the session active so the implicit sweep does not save it
        sessions.connect(key, "Bob", None);

        cache
            .store()
            .save(
                key,
                &TestRecord {
                    nickname: Some("Bob".to_owned()),
                    count: 7,
                },
            )
            .await
            .unwrap();

        let handle = cache.get(key).await.unwrap();
        handle.write().count = 9999;
        drop(handle);
        cache.force_drop(key).await;
        assert_eq!(cache.tier_of(key), (false, false));

        let handle = cache.get(key).await.unwrap();
        assert_eq!(handle.read().count, 7);
    }

    #[tokio::test]
    async fn save_all_survives_a_failing_entry() {
        let dir = TempDir::new().unwrap();
        let (_, cache) = fixture(&dir);
        let poisoned: Uuid = "aaaaaaaa-0000-4000-8000-000000000000".parse().unwrap();
        let healthy: Uuid = "bbbbbbbb-0000-4000-8000-000000000000".parse().unwrap();

        cache.get(poisoned).await.unwrap();
        cache.get(healthy).await.unwrap();

        // occupy the poisoned key's shard directory with a plain file so
        // its save cannot create the directory
        std::fs::write(dir.path().join("aa"), b"in the way").unwrap();

        cache.save_all().await;

        assert!(cache.store().load(healthy).await.unwrap().is_some());
        assert!(!cache.store().record_path(poisoned).exists());
    }

    #[tokio::test]
    async fn failed_save_keeps_entry_hot() {
        let dir = TempDir::new().unwrap();
        let (_, cache) = fixture(&dir);
        let key: Uuid = "cccccccc-0000-4000-8000-000000000000".parse().unwrap();

        cache.get(key).await.unwrap();
        std::fs::write(dir.path().join("cc"), b"in the way").unwrap();

        cache.evict_except(&HashSet::new()).await;
        assert_eq!(cache.tier_of(key), (true, false));

        let handle = cache.get(key).await.unwrap();
        assert!(handle.is_dirty());
    }

    #[tokio::test]
    async fn cold_overflow_saves_dirty_records() {
        let dir = TempDir::new().unwrap();
        let sessions = Arc::new(SessionTracker::new());
        let store = RecordStore::new(dir.path(), IO_TIMEOUT);
        let cache: VaultCache<TestRecord> = VaultCache::new(
            store,
            Arc::clone(&sessions) as Arc<dyn ActiveSessions>,
            NonZeroUsize::new(1).unwrap(),
        );
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let handle = cache.get(first).await.unwrap();
        cache.evict_except(&HashSet::new()).await;
        // dirty the record while it sits in the cold tier
        handle.write().count = 42;
        drop(handle);

        cache.get(second).await.unwrap();
        cache.evict_except(&HashSet::new()).await;
        assert_eq!(cache.tier_of(first), (false, false));
        assert_eq!(cache.tier_of(second), (false, true));

        let on_disk = cache.store().load(first).await.unwrap().unwrap();
        assert_eq!(on_disk.count, 42);
    }
}
