use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime settings, read from a YAML file next to the server's other
/// configuration. Missing fields fall back to defaults, so old config files
/// keep working across upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Directory user records are stored under.
    pub data_dir: PathBuf,
    /// How many demoted records the cold tier keeps around.
    pub cold_capacity: usize,
    /// Upper bound on a single disk read or write, in milliseconds.
    pub io_timeout_ms: u64,
    /// How often the background task flushes and sweeps, in seconds.
    pub autosave_interval_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("userdata"),
            cold_capacity: 256,
            io_timeout_ms: 5_000,
            autosave_interval_secs: 300,
        }
    }
}

impl VaultConfig {
    /// Read the config, writing a default one first if the file is missing.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(path, serde_yaml::to_string(&config)?)
                .with_context(|| format!("writing default config to {}", path.display()))?;
            return Ok(config);
        }

        let raw =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}
