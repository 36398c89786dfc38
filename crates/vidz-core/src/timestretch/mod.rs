//! Pitch-preserving time-stretch renders
//!
//! Tempo sync first changes playback rate directly (pitch moves with it),
//! then asks a [`StretchBackend`] for a rendition of the clip's base audio
//! that is `1/ratio` times as long at the original pitch. Once that rendition
//! is swapped in it plays at rate 1.0, so its timeline is the video timeline
//! divided by `ratio`.
//!
//! Backends:
//! - [`RubberbandCli`]: the external `rubberband` tool, located on PATH
//! - `SignalsmithRenderer`: in-process offline render (`signalsmith` feature)

mod rubberband;
#[cfg(feature = "signalsmith")]
mod signalsmith;

pub use rubberband::RubberbandCli;
#[cfg(feature = "signalsmith")]
pub use signalsmith::SignalsmithRenderer;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::{StretchBackendKind, StretchConfig};

/// Ratios closer to 1.0 than this are treated as no stretch
pub const UNITY_EPSILON: f64 = 1e-4;

/// Error type for stretch renders
#[derive(Debug, thiserror::Error)]
pub enum StretchError {
    #[error("Stretch tool not found")]
    ToolMissing,

    #[error("Failed to launch stretch tool: {0}")]
    Spawn(std::io::Error),

    #[error("Stretch tool exited with {code:?}: {stderr}")]
    ToolFailed { code: Option<i32>, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported stretch ratio {0}")]
    InvalidRatio(f64),

    #[error("Render cancelled")]
    Cancelled,
}

/// Renders a pitch-preserving rendition of a WAV file
///
/// `ratio` is the playback speed factor (master BPM / clip BPM). The output is
/// `1/ratio` times the input duration. Implementations block and must check
/// `cancel` at coarse checkpoints.
pub trait StretchBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn render(
        &self,
        input: &Path,
        ratio: f64,
        output: &Path,
        cancel: &AtomicBool,
    ) -> Result<(), StretchError>;
}

/// Calculate the playback ratio that brings a clip to the master tempo
///
/// Returns 1.0 if either tempo is non-positive or not finite.
pub fn ratio_from_bpm(clip_bpm: f64, master_bpm: f64) -> f64 {
    if clip_bpm > 0.0 && master_bpm > 0.0 && clip_bpm.is_finite() && master_bpm.is_finite() {
        master_bpm / clip_bpm
    } else {
        1.0
    }
}

/// Whether a ratio needs a corrected rendition at all
pub fn is_unity(ratio: f64) -> bool {
    (ratio - 1.0).abs() < UNITY_EPSILON
}

/// Map a video (clip-relative) position into a corrected rendition's timeline
pub fn to_rendition_ms(video_ms: f64, ratio: f64) -> f64 {
    video_ms / ratio
}

/// Map a corrected rendition position back onto the video timeline
pub fn to_clip_ms(rendition_ms: f64, ratio: f64) -> f64 {
    rendition_ms * ratio
}

/// Integer-millisecond form of [`to_rendition_ms`], truncating
pub fn rendition_position_ms(video_ms: u64, ratio: f64) -> u64 {
    to_rendition_ms(video_ms as f64, ratio) as u64
}

/// File name for a rendition: `{stem}_st_{ratio}_g{generation}.wav`
pub fn rendition_file_name(source: &Path, ratio: f64, generation: u64) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().replace(' ', "_"))
        .unwrap_or_else(|| "clip".to_string());
    format!("{}_st_{:.3}_g{}.wav", stem, ratio, generation)
}

/// Whether `name` was produced by [`rendition_file_name`]
pub fn is_rendition_file_name(name: &str) -> bool {
    let Some(rest) = name.strip_suffix(".wav") else {
        return false;
    };
    let Some((head, generation)) = rest.rsplit_once("_g") else {
        return false;
    };
    let Some((stem, ratio)) = head.rsplit_once("_st_") else {
        return false;
    };
    !stem.is_empty()
        && !generation.is_empty()
        && generation.bytes().all(|b| b.is_ascii_digit())
        && ratio.parse::<f64>().is_ok_and(|r| r.is_finite() && r > 0.0)
}

/// Build the configured backend
///
/// Returns `None` when stretching is disabled or the backend cannot run here.
/// Tempo sync then stays in instant (pitch-shifted) mode.
pub fn backend_from_config(config: &StretchConfig) -> Option<Arc<dyn StretchBackend>> {
    match config.backend {
        StretchBackendKind::Disabled => {
            log::info!("[STRETCH] Pitch correction disabled, instant rate changes only");
            None
        }
        StretchBackendKind::Rubberband => {
            let cli = match &config.rubberband_path {
                Some(path) => RubberbandCli::with_program(path.clone()),
                None => RubberbandCli::locate(),
            };
            match cli {
                Some(cli) => {
                    log::info!("[STRETCH] Using rubberband at {:?}", cli.program());
                    Some(Arc::new(cli))
                }
                None => {
                    log::warn!(
                        "[STRETCH] rubberband not found, tempo sync degrades to pitch-shifted playback"
                    );
                    None
                }
            }
        }
        #[cfg(feature = "signalsmith")]
        StretchBackendKind::Signalsmith => {
            log::info!("[STRETCH] Using in-process signalsmith renderer");
            Some(Arc::new(SignalsmithRenderer::default()))
        }
        #[cfg(not(feature = "signalsmith"))]
        StretchBackendKind::Signalsmith => {
            log::warn!("[STRETCH] Built without the signalsmith feature, pitch correction unavailable");
            None
        }
    }
}

/// Resolve the rendition output directory
pub fn rendition_dir(config: &StretchConfig) -> PathBuf {
    config
        .cache_dir
        .clone()
        .unwrap_or_else(crate::config::default_rendition_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_calculation() {
        assert!((ratio_from_bpm(100.0, 120.0) - 1.2).abs() < 1e-9);
        assert!((ratio_from_bpm(130.0, 120.0) - 120.0 / 130.0).abs() < 1e-9);
        assert_eq!(ratio_from_bpm(0.0, 120.0), 1.0);
        assert_eq!(ratio_from_bpm(100.0, -5.0), 1.0);
        assert_eq!(ratio_from_bpm(f64::NAN, 120.0), 1.0);
    }

    #[test]
    fn test_position_mapping_round_trip() {
        // One sample period at 48kHz, in ms
        let sample_period_ms = 1000.0 / 48000.0;
        for &ratio in &[0.5, 0.9, 1.0, 1.2, 1.3333, 2.0] {
            for &pos in &[0.0, 1.0, 4999.0, 5000.0, 123_456.0] {
                let back = to_clip_ms(to_rendition_ms(pos, ratio), ratio);
                assert!((back - pos).abs() < sample_period_ms, "{} @ {}", pos, ratio);
            }
        }
    }

    #[test]
    fn test_rendition_position_truncates() {
        assert_eq!(rendition_position_ms(5000, 1.2), 4166);
        assert_eq!(rendition_position_ms(5000, 1.0), 5000);
        assert_eq!(rendition_position_ms(5000, 0.5), 10000);
    }

    #[test]
    fn test_rendition_file_name() {
        let name = rendition_file_name(Path::new("/clips/my loop.mp4"), 1.2, 7);
        assert_eq!(name, "my_loop_st_1.200_g7.wav");
    }

    #[test]
    fn test_recognizes_rendition_names() {
        let name = rendition_file_name(Path::new("/clips/my loop.mp4"), 0.8333, 12);
        assert!(is_rendition_file_name(&name));
        for other in [
            "my_loop.wav",
            "my_loop_1234abcd_base.wav",
            "my_loop_st_1.200_g7.mp3",
            "my_loop_st_fast_g7.wav",
            "my_loop_st_1.200_g.wav",
            "_st_1.200_g7.wav",
        ] {
            assert!(!is_rendition_file_name(other), "{}", other);
        }
    }

    #[test]
    fn test_disabled_backend() {
        let config = StretchConfig {
            backend: StretchBackendKind::Disabled,
            ..Default::default()
        };
        assert!(backend_from_config(&config).is_none());
    }
}
