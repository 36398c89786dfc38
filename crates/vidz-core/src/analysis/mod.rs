//! Clip analysis - duration, tempo estimate and raw samples
//!
//! Analysis runs on worker threads (see [`crate::services`]). The engine only
//! needs three things from it: a duration, a tempo estimate, and mono sample
//! data for zero-crossing search. How the tempo is estimated is pluggable via
//! [`TempoEstimator`]; how media is decoded is pluggable via [`Analyzer`].
//!
//! The bundled [`MediaAnalyzer`] needs a WAV for the stretch backends to
//! render from (the clip's base audio):
//! - WAV clips are their own base audio
//! - a sidecar WAV next to the clip (`clip.mp4` -> `clip.wav`) is used as is
//! - anything else is decoded with symphonia and exported once into the
//!   cache directory as `{stem}_{hash}_base.wav`

mod decode;
mod tempo;

pub use tempo::{EnergyTempoEstimator, TempoEstimator};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clip::{ClipAudio, ClipMetadata};
use crate::types::DEFAULT_TEMPO_BPM;

use decode::{decode_media, read_mono, write_wav};

/// Suffix of exported base audio files
pub const BASE_AUDIO_SUFFIX: &str = "_base.wav";

/// Error type for clip analysis
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No decodable audio for {0:?}")]
    NoAudio(PathBuf),

    #[error("Failed to decode WAV: {0}")]
    Decode(#[from] hound::Error),

    #[error("Unsupported media: {0}")]
    Unsupported(String),

    #[error("Failed to open media: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to export base audio to {path:?}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Audio stream is empty")]
    Empty,

    #[error("Analysis cancelled")]
    Cancelled,
}

/// Everything analysis produces for one clip
#[derive(Debug, Clone)]
pub struct ClipAnalysis {
    pub metadata: ClipMetadata,
    pub audio: ClipAudio,
}

/// Media analysis service
///
/// Implementations block; they are only ever called from worker threads.
/// `cancel` should be checked at coarse checkpoints and answered with
/// [`AnalysisError::Cancelled`].
pub trait Analyzer: Send + Sync {
    fn analyze(&self, path: &Path, cancel: &AtomicBool) -> Result<ClipAnalysis, AnalysisError>;
}

/// Analyzer for any media symphonia can decode
pub struct MediaAnalyzer {
    estimator: Box<dyn TempoEstimator>,
    /// Where exported base audio goes
    audio_dir: PathBuf,
}

impl MediaAnalyzer {
    pub fn new(audio_dir: PathBuf) -> Self {
        Self::with_estimator(audio_dir, Box::new(EnergyTempoEstimator::default()))
    }

    pub fn with_estimator(audio_dir: PathBuf, estimator: Box<dyn TempoEstimator>) -> Self {
        Self {
            estimator,
            audio_dir,
        }
    }

    /// A WAV that already holds the clip's audio: the clip itself or its sidecar
    pub fn audio_path_for(path: &Path) -> Option<PathBuf> {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if is_wav {
            return Some(path.to_path_buf());
        }
        let sidecar = path.with_extension("wav");
        sidecar.exists().then_some(sidecar)
    }

    /// Where the exported base audio of `path` lives
    pub fn exported_audio_path(&self, path: &Path) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace(' ', "_"))
            .unwrap_or_else(|| "clip".to_string());
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        self.audio_dir
            .join(format!("{}_{:08x}{}", stem, hasher.finish() as u32, BASE_AUDIO_SUFFIX))
    }

    /// Mono samples, sample rate and base audio path for a clip
    fn load_audio(&self, path: &Path, cancel: &AtomicBool) -> Result<(Vec<f32>, u32, PathBuf), AnalysisError> {
        if let Some(wav) = Self::audio_path_for(path) {
            let (samples, sample_rate) = read_mono(&wav, cancel)?;
            return Ok((samples, sample_rate, wav));
        }

        let exported = self.exported_audio_path(path);
        if is_newer(&exported, path) {
            match read_mono(&exported, cancel) {
                Ok((samples, sample_rate)) => return Ok((samples, sample_rate, exported)),
                Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
                Err(e) => log::debug!("[ANALYSIS] Re-exporting unreadable {:?}: {}", exported, e),
            }
        }

        let decoded = decode_media(path, cancel)?;
        write_wav(&exported, &decoded).map_err(|source| AnalysisError::Export {
            path: exported.clone(),
            source,
        })?;
        log::info!("[ANALYSIS] Exported base audio of {:?} to {:?}", path, exported);
        Ok((decoded.to_mono(), decoded.sample_rate, exported))
    }
}

impl Analyzer for MediaAnalyzer {
    fn analyze(&self, path: &Path, cancel: &AtomicBool) -> Result<ClipAnalysis, AnalysisError> {
        let (samples, sample_rate, base_audio) = self.load_audio(path, cancel)?;
        if samples.is_empty() || sample_rate == 0 {
            return Err(AnalysisError::Empty);
        }

        if cancel.load(Ordering::Relaxed) {
            return Err(AnalysisError::Cancelled);
        }

        let duration_ms = samples.len() as u64 * 1000 / sample_rate as u64;
        let tempo = self
            .estimator
            .estimate(&samples, sample_rate)
            .unwrap_or_else(|| {
                log::debug!(
                    "[ANALYSIS] No tempo found for {:?}, assuming {} BPM",
                    path,
                    DEFAULT_TEMPO_BPM
                );
                DEFAULT_TEMPO_BPM
            });

        Ok(ClipAnalysis {
            metadata: ClipMetadata {
                path: path.to_path_buf(),
                estimated_tempo_bpm: tempo,
                duration_ms,
            },
            audio: ClipAudio {
                samples,
                sample_rate,
                base_audio_path: Some(base_audio),
            },
        })
    }
}

/// `target` exists and is at least as new as `source`
fn is_newer(target: &Path, source: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified());
    match (modified(target), modified(source)) {
        (Ok(target), Ok(source)) => target >= source,
        _ => false,
    }
}
