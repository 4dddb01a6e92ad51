use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{task, time};
use tracing::trace;
use uuid::Uuid;

use crate::{Error, Result};

const RECORD_EXT: &str = "json";

/// File-per-key persistence, sharded by the first two characters of the
/// key's string form so no single directory fans out over every player the
/// server has ever seen.
pub struct RecordStore<T> {
    base_dir: PathBuf,
    io_timeout: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(base_dir: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            base_dir: base_dir.into(),
            io_timeout,
            _record: PhantomData,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base>/<xx>/<uuid>.json`, where `xx` is the first two characters of
    /// the hyphenated UUID.
    pub fn record_path(&self, key: Uuid) -> PathBuf {
        let name = key.to_string();
        self.base_dir
            .join(&name[..2])
            .join(format!("{name}.{RECORD_EXT}"))
    }

    /// Load the record for `key`. `Ok(None)` means nothing is stored yet;
    /// the caller substitutes a default.
    pub async fn load(&self, key: Uuid) -> Result<Option<T>> {
        let path = self.record_path(key);
        let bytes = match self.bounded(move || std::fs::read(path)).await? {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record = serde_json::from_slice(&bytes)?;
        trace!(key = %key, "record read");
        Ok(Some(record))
    }

    /// Persist the record for `key`, creating the shard directory on first
    /// write.
    pub async fn save(&self, key: Uuid, record: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.write_bytes(key, bytes).await
    }

    /// Write pre-serialized record content.
    pub(crate) async fn write_bytes(&self, key: Uuid, bytes: Vec<u8>) -> Result<()> {
        let path = self.record_path(key);
        self.bounded(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)
        })
        .await??;
        trace!(key = %key, "record written");
        Ok(())
    }

    /// Run a blocking filesystem operation off the async runtime, waiting at
    /// most `io_timeout`. On timeout the blocking task keeps running; only
    /// the wait is abandoned.
    async fn bounded<F, R>(&self, op: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match time::timeout(self.io_timeout, task::spawn_blocking(op)).await {
            Err(_) => Err(Error::Timeout(self.io_timeout)),
            Ok(Err(join)) => Err(Error::Io(std::io::Error::other(join))),
            Ok(Ok(result)) => Ok(result),
        }
    }
}
