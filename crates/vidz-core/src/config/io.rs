//! YAML config files
//!
//! What the engine relies on here:
//! - A performance must start even when the config is broken. [`load_config`]
//!   never fails; a missing, unreadable or unparsable file yields defaults and
//!   a log line saying why.
//! - Config structs carry `#[serde(default)]` on every section, so a file that
//!   only sets `envelope.attack_ms` keeps every other tunable at its default.
//! - The player writes the defaults with [`save_config`] on first run, which
//!   gives users a complete file to edit.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read a YAML config, falling back to `T::default()` on any problem
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("[CONFIG] No config at {:?}, using defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("[CONFIG] Cannot read {:?} ({}), using defaults", path, e);
            return T::default();
        }
    };

    serde_yaml::from_str(&contents).unwrap_or_else(|e| {
        log::warn!("[CONFIG] Ignoring invalid {:?} ({}), using defaults", path, e);
        T::default()
    })
}

/// Write a config as YAML, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config: {:?}", path))?;
    log::info!("[CONFIG] Wrote {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrossfadeLaw, EngineConfig, StretchBackendKind};

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config.sequencer.catch_up_clamp, 16);
        assert_eq!(config.mixer.crossfade_law, CrossfadeLaw::Linear);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = EngineConfig::default();
        config.sequencer.catch_up_clamp = 4;
        config.mixer.crossfade_law = CrossfadeLaw::ConstantPower;
        config.stretch.backend = StretchBackendKind::Disabled;

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path);

        assert_eq!(loaded.sequencer.catch_up_clamp, 4);
        assert_eq!(loaded.mixer.crossfade_law, CrossfadeLaw::ConstantPower);
        assert_eq!(loaded.stretch.backend, StretchBackendKind::Disabled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "envelope:\n  attack_ms: 0\n").unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.envelope.attack_ms, 0.0);
        assert_eq!(loaded.envelope.release_ms, 10.0);
        assert_eq!(loaded.sequencer.poll_ms, 10);
    }

    #[test]
    fn test_wrong_types_return_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sequencer:\n  catch_up_clamp: lots\n").unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.sequencer.catch_up_clamp, 16);
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sequencer: [not, a, map").unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.sequencer.catch_up_clamp, 16);
    }
}
