//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/dryeye/` | `~/.local/share/dryeye/` |
//! | Config | `~/Library/Application Support/dryeye/` | `~/.config/dryeye/` |
//!
//! # Environment Overrides
//!
//! - `DRYEYE_DATA_DIR` overrides [`data_dir`]
//! - `DRYEYE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory (logs live underneath).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DRYEYE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("dryeye"))
        .unwrap_or_else(|| PathBuf::from("/tmp/dryeye-data"))
}

/// Application config directory, home of `config.toml`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("DRYEYE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("dryeye"))
        .unwrap_or_else(|| PathBuf::from("/tmp/dryeye-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
