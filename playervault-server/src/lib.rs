//! Per-player record storage for a game server.
//!
//! Records are JSON documents keyed by player UUID, sharded on disk by the
//! first two characters of the key. Loaded records live in a two-tier cache:
//! a hot map of strong handles for connected players, and a bounded cold
//! tier that keeps recently-demoted records around so a quick rejoin does
//! not hit the disk again. Demotion always saves first.
//!
//! Nothing in here talks to the host framework. The embedding plugin feeds
//! the [`SessionTracker`] from its join/quit handlers and hands out records
//! from the [`PlayerVault`].

pub mod cache;
pub mod config;
pub mod session;
pub mod store;
pub mod vault;

// Re-exports
pub use cache::{CacheStats, RecordHandle, VaultCache};
pub use config::VaultConfig;
pub use playervault_common::{Document, UserData};
pub use session::{ActiveSessions, SessionInfo, SessionTracker};
pub use store::RecordStore;
pub use vault::{PlayerVault, UserCache};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the record store and cache.
///
/// None of these are fatal: a single-key failure is returned to the caller,
/// and batch operations log the key and move on.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("storage did not respond within {0:?}")]
    Timeout(std::time::Duration),
}
