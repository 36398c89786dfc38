//! Clip registry
//!
//! Owns everything known about a clip: its analysis results, step pattern,
//! loop window, hot cues and loop mode. Clips are addressed by a stable
//! [`ClipId`] interned from the file path, so nothing else in the engine keys
//! state by raw path strings.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::pattern::{LoopWindow, StepPattern};
use crate::types::{ClipId, DEFAULT_TEMPO_BPM, HOT_CUE_SLOTS};

/// Analysis results for a clip. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipMetadata {
    pub path: PathBuf,
    pub estimated_tempo_bpm: f64,
    pub duration_ms: u64,
}

impl ClipMetadata {
    /// Metadata used when analysis fails: default tempo, zero duration
    pub fn fallback(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            estimated_tempo_bpm: DEFAULT_TEMPO_BPM,
            duration_ms: 0,
        }
    }
}

/// Decoded audio kept for zero-crossing search
#[derive(Debug, Clone, Default)]
pub struct ClipAudio {
    /// Mono (channel-averaged) samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Base audio rendition fed to the stretch backend (a WAV file)
    pub base_audio_path: Option<PathBuf>,
}

impl ClipAudio {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() || self.sample_rate == 0
    }

    /// Sample index for a clip position (floored)
    pub fn sample_index(&self, position_ms: f64) -> usize {
        (position_ms.max(0.0) / 1000.0 * self.sample_rate as f64) as usize
    }

    /// Clip position of a sample index, truncated to whole milliseconds
    pub fn position_ms(&self, index: usize) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (index as u64 * 1000) / self.sample_rate as u64
    }
}

/// Per-clip state held by the registry
#[derive(Debug, Clone)]
pub struct ClipEntry {
    pub path: PathBuf,
    pub metadata: Option<Arc<ClipMetadata>>,
    pub audio: Option<Arc<ClipAudio>>,
    pub pattern: StepPattern,
    pub loop_window: LoopWindow,
    /// Hot cue slot (1..=HOT_CUE_SLOTS) -> position in ms
    pub hot_cues: BTreeMap<u8, u64>,
    /// Whether the clip loops at its end instead of stopping
    pub looping: bool,
}

impl ClipEntry {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            metadata: None,
            audio: None,
            pattern: StepPattern::new(),
            loop_window: LoopWindow::default(),
            hot_cues: BTreeMap::new(),
            looping: true,
        }
    }

    /// Duration from metadata, 0 before analysis completes or after it fails
    pub fn duration_ms(&self) -> u64 {
        self.metadata.as_ref().map(|m| m.duration_ms).unwrap_or(0)
    }

    /// Detected tempo, `None` until analysis has produced metadata
    pub fn tempo_bpm(&self) -> Option<f64> {
        self.metadata.as_ref().map(|m| m.estimated_tempo_bpm)
    }
}

/// Registry of every clip seen this session
#[derive(Debug, Default)]
pub struct ClipRegistry {
    ids: HashMap<PathBuf, ClipId>,
    clips: Vec<ClipEntry>,
}

impl ClipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the id for a path, registering it on first sight
    pub fn intern(&mut self, path: &Path) -> ClipId {
        if let Some(&id) = self.ids.get(path) {
            return id;
        }
        let id = ClipId(self.clips.len() as u32);
        self.clips.push(ClipEntry::new(path.to_path_buf()));
        self.ids.insert(path.to_path_buf(), id);
        log::debug!("Registered {} for {:?}", id, path);
        id
    }

    pub fn id_of(&self, path: &Path) -> Option<ClipId> {
        self.ids.get(path).copied()
    }

    pub fn get(&self, id: ClipId) -> Option<&ClipEntry> {
        self.clips.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: ClipId) -> Option<&mut ClipEntry> {
        self.clips.get_mut(id.0 as usize)
    }

    pub fn path(&self, id: ClipId) -> Option<&Path> {
        self.get(id).map(|c| c.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// All clips in registration order
    pub fn iter(&self) -> impl Iterator<Item = (ClipId, &ClipEntry)> {
        self.clips
            .iter()
            .enumerate()
            .map(|(i, c)| (ClipId(i as u32), c))
    }

    /// Whether analysis results exist for the clip
    pub fn is_analyzed(&self, id: ClipId) -> bool {
        self.get(id).is_some_and(|c| c.metadata.is_some())
    }

    /// Store analysis results
    ///
    /// Metadata is created once per clip; a second call is ignored and
    /// returns false.
    pub fn set_analysis(
        &mut self,
        id: ClipId,
        metadata: ClipMetadata,
        audio: Option<ClipAudio>,
    ) -> bool {
        let Some(entry) = self.get_mut(id) else {
            return false;
        };
        if entry.metadata.is_some() {
            log::debug!("{} already analyzed, keeping existing metadata", id);
            return false;
        }
        entry.metadata = Some(Arc::new(metadata));
        entry.audio = audio.map(Arc::new);
        true
    }

    // --- Hot cues ---

    /// Set a hot cue. Slots outside 1..=HOT_CUE_SLOTS are rejected.
    pub fn set_hot_cue(&mut self, id: ClipId, slot: u8, position_ms: u64) -> bool {
        if !(1..=HOT_CUE_SLOTS).contains(&slot) {
            return false;
        }
        match self.get_mut(id) {
            Some(entry) => {
                entry.hot_cues.insert(slot, position_ms);
                true
            }
            None => false,
        }
    }

    pub fn hot_cue(&self, id: ClipId, slot: u8) -> Option<u64> {
        self.get(id).and_then(|c| c.hot_cues.get(&slot).copied())
    }

    pub fn clear_hot_cue(&mut self, id: ClipId, slot: u8) -> Option<u64> {
        self.get_mut(id).and_then(|c| c.hot_cues.remove(&slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_stable() {
        let mut reg = ClipRegistry::new();
        let a = reg.intern(Path::new("/clips/a.mp4"));
        let b = reg.intern(Path::new("/clips/b.mp4"));
        assert_ne!(a, b);
        assert_eq!(reg.intern(Path::new("/clips/a.mp4")), a);
        assert_eq!(reg.id_of(Path::new("/clips/b.mp4")), Some(b));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_metadata_is_set_once() {
        let mut reg = ClipRegistry::new();
        let path = Path::new("/clips/a.mp4");
        let id = reg.intern(path);
        assert!(!reg.is_analyzed(id));
        assert_eq!(reg.get(id).unwrap().tempo_bpm(), None);

        let meta = ClipMetadata {
            path: path.to_path_buf(),
            estimated_tempo_bpm: 100.0,
            duration_ms: 8000,
        };
        assert!(reg.set_analysis(id, meta, None));
        assert!(!reg.set_analysis(id, ClipMetadata::fallback(path), None));
        assert_eq!(reg.get(id).unwrap().duration_ms(), 8000);
        assert_eq!(reg.get(id).unwrap().tempo_bpm(), Some(100.0));
    }

    #[test]
    fn test_hot_cue_slots() {
        let mut reg = ClipRegistry::new();
        let id = reg.intern(Path::new("/clips/a.mp4"));
        assert!(reg.set_hot_cue(id, 1, 1500));
        assert!(!reg.set_hot_cue(id, 0, 10));
        assert!(!reg.set_hot_cue(id, HOT_CUE_SLOTS + 1, 10));
        assert_eq!(reg.hot_cue(id, 1), Some(1500));
        assert_eq!(reg.clear_hot_cue(id, 1), Some(1500));
        assert_eq!(reg.hot_cue(id, 1), None);
    }

    #[test]
    fn test_sample_position_conversion() {
        let audio = ClipAudio {
            samples: vec![0.0; 48000],
            sample_rate: 48000,
            base_audio_path: None,
        };
        assert_eq!(audio.sample_index(500.0), 24000);
        assert_eq!(audio.position_ms(24000), 500);
        assert_eq!(audio.position_ms(47), 0);
    }
}
