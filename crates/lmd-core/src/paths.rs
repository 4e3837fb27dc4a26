//! Common filesystem paths used by lmd.

use std::path::PathBuf;

/// Base directory for lmd state (config, socket, default data directory).
///
/// Defaults to `~/.lmd`, but can be overridden via `LMD_DIR` for testing or
/// multi-instance setups.
pub fn lmd_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LMD_DIR") {
        return PathBuf::from(dir);
    }

    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lmd")
}

/// Path to the lmd configuration file.
pub fn config_path() -> PathBuf {
    lmd_dir().join("config.toml")
}

/// Path to the daemon query socket.
pub fn socket_path() -> PathBuf {
    lmd_dir().join("daemon.sock")
}

/// Default location of the persisted frequency tables.
pub fn default_data_dir() -> PathBuf {
    lmd_dir().join("data")
}

#[doc(hidden)]
pub fn test_env_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
