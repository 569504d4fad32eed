//! Default paths for shiftlog components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/shiftd/shiftd.sock` or `/tmp/shiftd-$USER/shiftd.sock`
//! - Data: `$XDG_DATA_HOME/shiftd` or `~/.local/share/shiftd`
//! - Config: `$XDG_CONFIG_HOME/shiftlog/config.toml` or `~/.config/shiftlog/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const SHIFTLOG_SOCKET_ENV: &str = "SHIFTLOG_SOCKET";

/// Environment variable for overriding the data directory
pub const SHIFTLOG_DATA_DIR_ENV: &str = "SHIFTLOG_DATA_DIR";

const SOCKET_FILENAME: &str = "shiftd.sock";

const APP_DIR: &str = "shiftd";

const CONFIG_DIR: &str = "shiftlog";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$SHIFTLOG_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/shiftd/shiftd.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/shiftd-$USER/shiftd.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SHIFTLOG_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking SHIFTLOG_SOCKET.
/// Used for config defaults, where the env var is checked separately by clap.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory (holds the local SQLite store).
///
/// Order of precedence:
/// 1. `$SHIFTLOG_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/shiftd` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/shiftd` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(SHIFTLOG_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking SHIFTLOG_DATA_DIR.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(CONFIG_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(CONFIG_DIR).join("config.toml")
}
