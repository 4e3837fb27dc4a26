//! Configuration management for lmd.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default number of token-trigram shards.
pub const DEFAULT_SHARD_COUNT: u32 = 128;

/// Default flush threshold, in accumulated occurrences.
pub const DEFAULT_BLOCK_SIZE: u64 = 10_000;

/// Default number of writer threads.
pub const DEFAULT_WRITERS: usize = 4;

/// Main configuration structure for lmd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the persisted frequency tables.
    pub data_dir: PathBuf,

    /// Number of token-trigram shards (`hash(first) mod shard_count`).
    pub shard_count: u32,

    /// An accumulator is flushed once its total exceeds this value.
    pub block_size: u64,

    /// Maximum number of documents processed concurrently.
    pub workers: usize,

    /// Number of writer threads performing flush I/O.
    pub writers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: crate::paths::default_data_dir(),
            shard_count: DEFAULT_SHARD_COUNT,
            block_size: DEFAULT_BLOCK_SIZE,
            workers: num_cpus::get(),
            writers: DEFAULT_WRITERS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;

        // Expand tilde (~) in paths
        let home = std::env::var("HOME").unwrap_or_else(|_| "/".to_string());
        config.data_dir = Self::expand_tilde(&config.data_dir, &home);

        config.validate()?;
        Ok(config)
    }

    /// Load `<lmd_dir>/config.toml` if it exists, otherwise fall back to defaults.
    pub fn load_or_default() -> crate::Result<Self> {
        let path = crate::paths::config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            Self::load(&path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.shard_count == 0 {
            return Err(crate::Error::Config(
                "shard_count must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(crate::Error::Config("workers must be at least 1".to_string()));
        }
        if self.writers == 0 {
            return Err(crate::Error::Config("writers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Expand tilde in a single path.
    fn expand_tilde(path: &Path, home: &str) -> PathBuf {
        let path_str = path.to_string_lossy();

        if path_str == "~" {
            PathBuf::from(home)
        } else if let Some(rest) = path_str.strip_prefix("~/") {
            PathBuf::from(home).join(rest)
        } else {
            path.to_path_buf()
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
