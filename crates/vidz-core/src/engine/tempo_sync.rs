//! Tempo sync bookkeeping
//!
//! Tracks, per clip, which playback ratio the corrected phase is working
//! towards and under which generation. Every ratio change bumps the clip's
//! generation, so a render that finishes after the target moved on is
//! recognised as stale and dropped.

use std::collections::HashMap;

use crate::services::JobHandle;
use crate::timestretch::ratio_from_bpm;
use crate::types::ClipId;

/// Progress of the corrected phase for a clip
#[derive(Debug, Clone)]
pub enum SyncState {
    /// Unity ratio, no base audio or no backend: instant phase only
    NotRequested,
    /// Render in flight
    Pending(JobHandle),
    /// Rendition published
    Ready,
    /// Render failed; stays in instant phase until the ratio changes
    Failed,
}

#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub generation: u64,
    pub ratio: f64,
    pub state: SyncState,
}

#[derive(Debug)]
pub struct TempoSync {
    enabled: bool,
    targets: HashMap<ClipId, SyncTarget>,
}

impl Default for TempoSync {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TempoSync {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            targets: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Ratio a clip should play at. 1.0 while sync is off or the tempo is unknown.
    pub fn target_ratio(&self, master_bpm: f64, clip_bpm: Option<f64>) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        clip_bpm
            .map(|bpm| ratio_from_bpm(bpm, master_bpm))
            .unwrap_or(1.0)
    }

    /// Point a clip at a new ratio
    ///
    /// Returns the new generation if the ratio changed. Any render still in
    /// flight for the previous ratio is interrupted. Returns `None` when the
    /// clip already targets this ratio.
    pub fn retarget(&mut self, clip: ClipId, ratio: f64) -> Option<u64> {
        let target = self.targets.entry(clip).or_insert(SyncTarget {
            generation: 0,
            ratio: f64::NAN,
            state: SyncState::NotRequested,
        });
        if same_ratio(target.ratio, ratio) {
            return None;
        }
        if let SyncState::Pending(handle) = &target.state {
            log::debug!(
                "[SYNC] {} retargeted {:.3}x -> {:.3}x, interrupting job {}",
                clip,
                target.ratio,
                ratio,
                handle.id
            );
            handle.interrupt();
        }
        target.generation += 1;
        target.ratio = ratio;
        target.state = SyncState::NotRequested;
        Some(target.generation)
    }

    pub fn target(&self, clip: ClipId) -> Option<&SyncTarget> {
        self.targets.get(&clip)
    }

    pub fn generation(&self, clip: ClipId) -> u64 {
        self.targets.get(&clip).map(|t| t.generation).unwrap_or(0)
    }

    /// Whether a result tagged `generation` is still wanted
    pub fn is_current(&self, clip: ClipId, generation: u64) -> bool {
        self.targets
            .get(&clip)
            .is_some_and(|t| t.generation == generation)
    }

    pub fn set_pending(&mut self, clip: ClipId, generation: u64, handle: JobHandle) {
        match self.targets.get_mut(&clip) {
            Some(t) if t.generation == generation => t.state = SyncState::Pending(handle),
            _ => handle.interrupt(),
        }
    }

    /// Mark the current render as published. False if `generation` is stale.
    pub fn accept(&mut self, clip: ClipId, generation: u64) -> bool {
        self.finish(clip, generation, SyncState::Ready)
    }

    /// Mark the current render as failed. False if `generation` is stale.
    pub fn fail(&mut self, clip: ClipId, generation: u64) -> bool {
        self.finish(clip, generation, SyncState::Failed)
    }

    /// A cached rendition covers the current target
    pub fn mark_ready(&mut self, clip: ClipId) {
        if let Some(t) = self.targets.get_mut(&clip) {
            if let SyncState::Pending(handle) = &t.state {
                handle.interrupt();
            }
            t.state = SyncState::Ready;
        }
    }

    fn finish(&mut self, clip: ClipId, generation: u64, state: SyncState) -> bool {
        match self.targets.get_mut(&clip) {
            Some(t) if t.generation == generation => {
                t.state = state;
                true
            }
            _ => false,
        }
    }
}

fn same_ratio(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-4
}
