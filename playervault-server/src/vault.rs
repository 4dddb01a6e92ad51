use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use playervault_common::UserData;
use tokio::{task::JoinHandle, time};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    cache::{RecordHandle, VaultCache},
    config::VaultConfig,
    session::{ActiveSessions, SessionTracker},
    store::RecordStore,
};

/// The record cache specialized to the built-in user schema.
pub type UserCache = VaultCache<UserData>;

/// Composition root: one store, one cache, one session tracker, built once
/// from the config and passed to whoever needs them.
///
/// The embedding plugin wires its join handler to [`handle_connect`], its
/// quit handler to [`handle_disconnect`], and calls [`shutdown`] when the
/// server stops.
///
/// [`handle_connect`]: PlayerVault::handle_connect
/// [`handle_disconnect`]: PlayerVault::handle_disconnect
/// [`shutdown`]: PlayerVault::shutdown
pub struct PlayerVault {
    pub cache: Arc<UserCache>,
    pub sessions: Arc<SessionTracker>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerVault {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let cold_capacity =
            NonZeroUsize::new(config.cold_capacity).context("cold_capacity must be at least 1")?;
        let sessions = Arc::new(SessionTracker::new());
        let store = RecordStore::new(config.data_dir.clone(), config.io_timeout());
        let cache = Arc::new(VaultCache::new(
            store,
            Arc::clone(&sessions) as Arc<dyn ActiveSessions>,
            cold_capacity,
        ));
        Ok(Self {
            cache,
            sessions,
            autosave: Mutex::new(None),
        })
    }

    /// Join hook: open the session, load the record and stamp it.
    pub async fn handle_connect(
        &self,
        key: Uuid,
        name: &str,
        address: Option<String>,
    ) -> Result<Arc<RecordHandle<UserData>>> {
        self.sessions.connect(key, name, address.clone());
        let handle = self
            .cache
            .get(key)
            .await
            .with_context(|| format!("loading record for {key}"))?;
        handle.write().record_login(name, address, Utc::now());
        Ok(handle)
    }

    /// Quit hook: stamp last-seen, close the session, run an eviction sweep.
    pub async fn handle_disconnect(&self, key: Uuid) {
        match self.cache.get(key).await {
            Ok(handle) => handle.write().record_logout(Utc::now()),
            Err(err) => warn!(key = %key, "no record to stamp on disconnect: {err:?}"),
        }
        self.sessions.disconnect(key);
        self.cache.evict_inactive().await;
    }

    /// Start the periodic flush-and-sweep task, replacing any previous one.
    pub fn spawn_autosave(self: &Arc<Self>, interval: Duration) {
        let task = tokio::spawn({
            let vault = Arc::clone(self);
            async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
                // the first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    vault.cache.save_all().await;
                    vault.cache.evict_inactive().await;
                }
            }
        });
        if let Some(old) = self.autosave.lock().replace(task) {
            old.abort();
        }
    }

    /// Stop the autosave task and flush everything still loaded.
    pub async fn shutdown(&self) {
        if let Some(task) = self.autosave.lock().take() {
            task.abort();
        }
        self.cache.save_all().await;
        info!("player vault flushed");
    }
}
