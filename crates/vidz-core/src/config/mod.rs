//! Configuration for vidz
//!
//! - Generic YAML config loading/saving
//! - Engine tunables (envelope, step clock, crossfade law, stretch backend)
//! - Standard file locations
//!
//! # Usage
//!
//! ```ignore
//! use vidz_core::config::{load_config, default_config_path, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path("config.yaml"));
//! ```

mod engine;
mod io;
mod paths;

pub use engine::{
    CrossfadeLaw, EngineConfig, EnvelopeConfig, MidiInputConfig, MixerConfig, SequencerConfig,
    StretchBackendKind, StretchConfig, TriggerConfig, WorkerConfig,
};
pub use io::{load_config, save_config};
pub use paths::{
    default_config_dir, default_config_path, default_rendition_dir, default_session_path,
};
