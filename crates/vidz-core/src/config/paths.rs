//! Standard locations for vidz files

use std::path::PathBuf;

/// Get the vidz configuration directory
///
/// Returns: `{config_dir}/vidz` (e.g. `~/.config/vidz` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vidz")
}

/// Get the default path of a config file
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

/// Default session file loaded at startup and written on exit
pub fn default_session_path() -> PathBuf {
    default_config_dir().join("session.json")
}

/// Directory for pitch-corrected renditions
///
/// Returns: `{cache_dir}/vidz/renditions`
pub fn default_rendition_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vidz")
        .join("renditions")
}
