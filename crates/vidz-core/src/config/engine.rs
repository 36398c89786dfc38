//! Engine configuration
//!
//! Every section is `#[serde(default)]` so a config file only needs to name
//! the values it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::DEFAULT_TEMPO_BPM;

/// Top-level configuration for the performance engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master tempo used when no session overrides it
    pub default_master_bpm: f64,
    pub envelope: EnvelopeConfig,
    pub trigger: TriggerConfig,
    pub sequencer: SequencerConfig,
    pub mixer: MixerConfig,
    pub stretch: StretchConfig,
    pub workers: WorkerConfig,
    pub midi: MidiInputConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_master_bpm: DEFAULT_TEMPO_BPM,
            envelope: EnvelopeConfig::default(),
            trigger: TriggerConfig::default(),
            sequencer: SequencerConfig::default(),
            mixer: MixerConfig::default(),
            stretch: StretchConfig::default(),
            workers: WorkerConfig::default(),
            midi: MidiInputConfig::default(),
        }
    }
}

/// Attack/release envelope applied on every trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Fade-in time after a trigger. 0 means a single tick.
    pub attack_ms: f64,
    /// Fade-out time on release. 0 means a single tick.
    pub release_ms: f64,
    /// Envelope tick interval on the control thread
    pub tick_ms: u64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack_ms: 10.0,
            release_ms: 10.0,
            tick_ms: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Half-width of the zero-crossing search around the requested position
    pub zero_crossing_window_ms: f64,
    /// Loop length of a held stutter until a size action changes it
    pub stutter_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            zero_crossing_window_ms: 20.0,
            stutter_ms: 500,
        }
    }
}

/// Step clock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Poll interval of the step clock on the control thread
    pub poll_ms: u64,
    /// Largest backlog of steps fired in one poll. Longer stalls (suspend,
    /// debugger) skip straight to the current step.
    pub catch_up_clamp: u64,
    /// Step grid used by the quantize action
    pub quantize_grid: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_ms: 10,
            catch_up_clamp: 16,
            quantize_grid: 4,
        }
    }
}

/// Crossfader taper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeLaw {
    /// A = 1-x, B = x
    #[default]
    Linear,
    /// A = cos(x*pi/2), B = sin(x*pi/2)
    ConstantPower,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub crossfade_law: CrossfadeLaw,
}

/// Which renderer produces pitch-corrected renditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StretchBackendKind {
    /// External `rubberband` command-line tool
    #[default]
    Rubberband,
    /// In-process signalsmith-stretch (needs the `signalsmith` feature)
    Signalsmith,
    /// Instant (pitch-shifted) rate changes only
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchConfig {
    pub backend: StretchBackendKind,
    /// Explicit path to the rubberband binary. Searched on PATH when unset.
    pub rubberband_path: Option<PathBuf>,
    /// Where renditions are written. Defaults to the user cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Unreferenced renditions kept per clip before the oldest are deleted
    pub retention_per_clip: usize,
}

impl Default for StretchConfig {
    fn default() -> Self {
        Self {
            backend: StretchBackendKind::default(),
            rubberband_path: None,
            cache_dir: None,
            retention_per_clip: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Analysis/stretch worker threads. 0 lets rayon decide.
    pub threads: usize,
    /// How long shutdown waits for in-flight jobs after interrupting them
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            shutdown_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiInputConfig {
    /// Case-insensitive substring of the input port name. `None` disables MIDI.
    pub port_match: Option<String>,
}
