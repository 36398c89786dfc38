//! Deck - one performance slot
//!
//! A deck plays one clip through three outputs: video, main audio and
//! monitor (cue) audio. Video always runs on the clip's own timeline. The
//! audio paths either play the clip's base audio at the same rate as the
//! video, or a pitch-corrected rendition at rate 1.0 whose timeline is the
//! video timeline divided by the rendition's ratio.
//!
//! Transport calls on a deck without a playable clip (nothing loaded, or a
//! clip whose analysis left it at zero duration) are no-ops.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::envelope::{Envelope, EnvelopeEvent, EnvelopeState};
use super::renditions::AudioRendition;
use super::transport::{MediaSource, MediaTransport, OutputFactory, OutputKind};
use crate::timestretch::{is_unity, rendition_position_ms};
use crate::types::{ClipId, DeckId};

/// A deck's three outputs
pub struct DeckOutputs {
    pub video: Box<dyn MediaTransport>,
    pub main_audio: Box<dyn MediaTransport>,
    pub monitor_audio: Box<dyn MediaTransport>,
}

impl DeckOutputs {
    pub fn create(factory: &dyn OutputFactory, deck: DeckId) -> Self {
        Self {
            video: factory.create(deck, OutputKind::Video),
            main_audio: factory.create(deck, OutputKind::MainAudio),
            monitor_audio: factory.create(deck, OutputKind::MonitorAudio),
        }
    }
}

/// A single deck
pub struct Deck {
    id: DeckId,
    /// Loaded clip
    clip: Option<ClipId>,
    clip_path: Option<PathBuf>,
    /// Base audio the audio paths play when no rendition is active
    base_audio: Option<PathBuf>,
    /// Clip duration, 0 until analysis provides it
    duration_ms: u64,
    /// Current tempo-sync ratio applied to the video
    playback_rate: f64,
    is_looping: bool,
    /// Volume set by the mixer (0.0-1.0)
    volume_target: f32,
    /// Whether the monitor path hears this deck
    cue_enabled: bool,
    envelope: Envelope,
    /// Active pitch-corrected rendition, if any
    rendition: Option<Arc<AudioRendition>>,
    /// Sequencer position within the clip's loop window
    step_pointer: Option<u32>,
    outputs: DeckOutputs,
}

impl Deck {
    pub fn new(id: DeckId, outputs: DeckOutputs, envelope: Envelope) -> Self {
        let mut deck = Self {
            id,
            clip: None,
            clip_path: None,
            base_audio: None,
            duration_ms: 0,
            playback_rate: 1.0,
            is_looping: true,
            volume_target: 1.0,
            cue_enabled: false,
            envelope,
            rendition: None,
            step_pointer: None,
            outputs,
        };
        deck.apply_levels();
        deck
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    // --- Clip binding ---

    /// Bind a new clip
    ///
    /// Resets position to 0, clears the active rendition and the step pointer,
    /// and leaves the deck paused. Duration stays 0 until [`Deck::set_media_info`].
    pub fn load_clip(&mut self, clip: ClipId, path: &Path) {
        self.clip = Some(clip);
        self.clip_path = Some(path.to_path_buf());
        self.base_audio = None;
        self.duration_ms = 0;
        self.rendition = None;
        self.playback_rate = 1.0;
        self.step_pointer = None;
        self.envelope.reset();

        let source = MediaSource {
            path: path.to_path_buf(),
            duration_ms: 0,
        };
        self.outputs.video.set_source(Some(source.clone()));
        self.outputs.main_audio.set_source(Some(source.clone()));
        self.outputs.monitor_audio.set_source(Some(source));
        self.for_each_output(|o| o.set_rate(1.0));
        let looping = self.is_looping;
        self.for_each_output(|o| o.set_looping(looping));
        self.apply_levels();
    }

    /// Unbind the clip
    pub fn unload(&mut self) {
        self.clip = None;
        self.clip_path = None;
        self.base_audio = None;
        self.duration_ms = 0;
        self.rendition = None;
        self.playback_rate = 1.0;
        self.step_pointer = None;
        self.envelope.reset();
        self.for_each_output(|o| o.set_source(None));
        self.apply_levels();
    }

    /// Apply analysis results: clip duration and base audio file
    pub fn set_media_info(&mut self, duration_ms: u64, base_audio: Option<PathBuf>) {
        let Some(path) = self.clip_path.clone() else {
            return;
        };
        self.duration_ms = duration_ms;
        self.base_audio = base_audio;
        self.outputs.video.set_source(Some(MediaSource {
            path: path.clone(),
            duration_ms,
        }));
        let audio = MediaSource {
            path: self.base_audio.clone().unwrap_or(path),
            duration_ms,
        };
        self.outputs.main_audio.set_source(Some(audio.clone()));
        self.outputs.monitor_audio.set_source(Some(audio));
        let (rate, looping) = (self.playback_rate, self.is_looping);
        self.for_each_output(|o| {
            o.set_rate(rate);
            o.set_looping(looping);
        });
    }

    pub fn clip(&self) -> Option<ClipId> {
        self.clip
    }

    pub fn clip_path(&self) -> Option<&Path> {
        self.clip_path.as_deref()
    }

    pub fn base_audio(&self) -> Option<&Path> {
        self.base_audio.as_deref()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// A clip is bound and has a usable duration
    pub fn is_playable(&self) -> bool {
        self.clip.is_some() && self.duration_ms > 0
    }

    // --- Playback controls ---

    /// Video (clip timeline) position
    pub fn position_ms(&self) -> u64 {
        self.outputs.video.position_ms()
    }

    pub fn is_playing(&self) -> bool {
        self.outputs.video.is_playing()
    }

    /// Audio position matching a video position under the active rendition
    pub fn audio_position_for(&self, video_ms: u64) -> u64 {
        match &self.rendition {
            Some(r) => rendition_position_ms(video_ms, r.ratio),
            None => video_ms,
        }
    }

    /// Seek all outputs. Clamped to the clip.
    pub fn seek(&mut self, position_ms: u64) {
        if !self.is_playable() {
            return;
        }
        let video_ms = position_ms.min(self.duration_ms.saturating_sub(1));
        let audio_ms = self.audio_position_for(video_ms);
        self.outputs.video.seek(video_ms);
        self.outputs.main_audio.seek(audio_ms);
        self.outputs.monitor_audio.seek(audio_ms);
    }

    /// Resume from pause, fading in from the current envelope level
    pub fn play(&mut self) {
        if !self.is_playable() {
            return;
        }
        self.for_each_output(|o| o.play());
        self.envelope.resume();
        self.apply_levels();
    }

    pub fn pause(&mut self) {
        if !self.is_playable() {
            return;
        }
        self.for_each_output(|o| o.pause());
    }

    /// Restart at `safe_position_ms` behind a mute, then ramp in
    ///
    /// Called by the trigger engine after it has picked a click-free position.
    pub fn restart_at(&mut self, safe_position_ms: u64) {
        if !self.is_playable() {
            return;
        }
        self.for_each_output(|o| o.set_muted(true));
        self.seek(safe_position_ms);
        if !self.outputs.video.is_playing() {
            self.for_each_output(|o| o.play());
        }
        self.envelope.start_attack();
        self.apply_levels();
        self.for_each_output(|o| o.set_muted(false));
    }

    /// Start the release ramp of a held trigger
    pub fn release(&mut self) {
        self.envelope.release();
    }

    /// Advance the envelope. Returns true if release finished and the deck paused.
    pub fn tick_envelope(&mut self, tick_ms: f64) -> bool {
        if !self.envelope.is_ramping() {
            return false;
        }
        let event = self.envelope.tick(tick_ms);
        self.apply_levels();
        if event == EnvelopeEvent::Finished {
            self.pause();
            return true;
        }
        false
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    pub fn set_envelope_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.envelope.set_times(attack_ms, release_ms);
    }

    // --- Rate and renditions ---

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    /// Instant (pitch-shifting) rate change
    ///
    /// A rendition rendered for a different ratio is dropped and the audio
    /// paths fall back to the base audio at the new rate, lined up with the
    /// video.
    pub fn set_instant_rate(&mut self, ratio: f64) {
        self.playback_rate = ratio;
        if self.clip.is_none() {
            return;
        }
        self.outputs.video.set_rate(ratio);

        match &self.rendition {
            Some(r) if r.matches_ratio(ratio) => {}
            Some(_) => self.revert_to_base_audio(),
            None => {
                self.outputs.main_audio.set_rate(ratio);
                self.outputs.monitor_audio.set_rate(ratio);
            }
        }
    }

    fn revert_to_base_audio(&mut self) {
        self.rendition = None;
        let Some(path) = self.base_audio.clone().or_else(|| self.clip_path.clone()) else {
            return;
        };
        let source = MediaSource {
            path,
            duration_ms: self.duration_ms,
        };
        self.replace_audio(source, self.playback_rate, self.position_ms());
    }

    /// Swap in a pitch-corrected rendition
    ///
    /// Audio switches to the rendition at rate 1.0, positioned at
    /// `video / ratio`. Returns false if the rendition doesn't belong to the
    /// loaded clip or the deck's current rate.
    pub fn swap_rendition(&mut self, rendition: Arc<AudioRendition>) -> bool {
        if !self.is_playable() || self.clip != Some(rendition.clip) {
            return false;
        }
        if !rendition.matches_ratio(self.playback_rate) || is_unity(rendition.ratio) {
            return false;
        }
        let source = MediaSource {
            path: rendition.path.clone(),
            duration_ms: rendition_position_ms(self.duration_ms, rendition.ratio),
        };
        let audio_ms = rendition_position_ms(self.position_ms(), rendition.ratio);
        self.rendition = Some(rendition);
        self.replace_audio(source, 1.0, audio_ms);
        true
    }

    fn replace_audio(&mut self, source: MediaSource, rate: f64, position_ms: u64) {
        let playing = self.outputs.video.is_playing();
        let looping = self.is_looping;
        for out in [&mut self.outputs.main_audio, &mut self.outputs.monitor_audio] {
            out.set_source(Some(source.clone()));
            out.set_rate(rate);
            out.set_looping(looping);
            out.seek(position_ms);
            if playing {
                out.play();
            }
        }
        self.apply_levels();
    }

    pub fn active_rendition(&self) -> Option<&Arc<AudioRendition>> {
        self.rendition.as_ref()
    }

    // --- Levels and routing ---

    /// Set the mixer volume (0.0-1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume_target = volume.clamp(0.0, 1.0);
        self.apply_levels();
    }

    pub fn volume(&self) -> f32 {
        self.volume_target
    }

    /// Gain/opacity currently applied (`volume * envelope level`)
    pub fn applied_level(&self) -> f32 {
        self.volume_target * self.envelope.level()
    }

    pub fn set_cue_enabled(&mut self, enabled: bool) {
        self.cue_enabled = enabled;
        self.apply_levels();
    }

    pub fn cue_enabled(&self) -> bool {
        self.cue_enabled
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.is_looping = looping;
        if self.clip.is_some() {
            self.for_each_output(|o| o.set_looping(looping));
        }
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    /// Push levels to the outputs
    ///
    /// Video opacity and main gain follow `volume * envelope`. The monitor
    /// path hears the envelope alone (pre-fader) when cue is enabled.
    fn apply_levels(&mut self) {
        let level = self.applied_level();
        let monitor = if self.cue_enabled {
            self.envelope.level()
        } else {
            0.0
        };
        self.outputs.video.set_level(level);
        self.outputs.main_audio.set_level(level);
        self.outputs.monitor_audio.set_level(monitor);
    }

    // --- Sequencer ---

    pub fn step_pointer(&self) -> Option<u32> {
        self.step_pointer
    }

    pub fn set_step_pointer(&mut self, pointer: Option<u32>) {
        self.step_pointer = pointer;
    }

    // --- Outputs ---

    pub fn video(&self) -> &dyn MediaTransport {
        self.outputs.video.as_ref()
    }

    pub fn main_audio(&self) -> &dyn MediaTransport {
        self.outputs.main_audio.as_ref()
    }

    pub fn monitor_audio(&self) -> &dyn MediaTransport {
        self.outputs.monitor_audio.as_ref()
    }

    fn for_each_output(&mut self, mut f: impl FnMut(&mut dyn MediaTransport)) {
        f(self.outputs.video.as_mut());
        f(self.outputs.main_audio.as_mut());
        f(self.outputs.monitor_audio.as_mut());
    }
}
