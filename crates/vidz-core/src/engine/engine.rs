//! Performance engine - ties together decks, tempo sync, sequencer and mixer
//!
//! The engine is owned by the control thread (see [`super::control`]). All
//! mutation happens through `&mut self`, either from an [`EngineCommand`], a
//! worker result, or one of the two timer ticks (envelope and step clock).
//! Nothing here blocks: analysis and stretch renders are handed to
//! [`ServiceWorkers`] and come back through [`PerformanceEngine::handle_service_result`].

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;

use super::command::EngineCommand;
use super::deck::{Deck, DeckOutputs};
use super::envelope::Envelope;
use super::mixer::{CrossfadeSide, Mixer};
use super::renditions::{sweep_rendition_dir, RenditionCache};
use super::step_clock::StepClock;
use super::stutter::{Stutter, StutterMode};
use super::tempo_sync::TempoSync;
use super::transport::OutputFactory;
use super::trigger::TriggerEngine;
use crate::clip::{ClipAudio, ClipMetadata, ClipRegistry, LoopWindow};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::control::{Action, Binding, ControlRouter, ControlValue, InputEvent};
use crate::services::{
    AnalysisOutcome, JobHandle, ServiceResult, ServiceWorkers, StretchOutcome,
};
use crate::session::{BankSlots, Session};
use crate::timestretch::{is_unity, rendition_dir, rendition_file_name};
use crate::types::{ClipId, DeckId, SeqRate, MAX_BPM, MIN_BPM, NUM_BANKS, NUM_DECKS};

/// Tap timestamps averaged by tap tempo
const TAP_HISTORY: usize = 4;

/// A pause longer than this starts a new tap series
const TAP_RESET: Duration = Duration::from_secs(2);

/// Master tempo change per nudge action
const NUDGE_STEP_BPM: f64 = 0.1;

/// The performance engine
pub struct PerformanceEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    /// The 4 decks
    decks: [Deck; NUM_DECKS],
    registry: ClipRegistry,
    renditions: RenditionCache,
    tempo_sync: TempoSync,
    trigger: TriggerEngine,
    step_clock: StepClock,
    mixer: Mixer,
    router: ControlRouter,
    workers: ServiceWorkers,
    rendition_dir: PathBuf,
    banks: [BankSlots; NUM_BANKS],
    current_bank: usize,
    master_bpm: f64,
    tap_times: VecDeque<Duration>,
    /// Held stutter per deck
    stutters: [Option<Stutter>; NUM_DECKS],
    stutter_ms: u64,
    /// Beat-phase reference for phase alignment (sequencer start)
    transport_origin: Duration,
    /// Bumped on bank switch; analysis results from older generations are dropped
    analysis_generation: u64,
    analysis_jobs: HashMap<ClipId, JobHandle>,
}

impl PerformanceEngine {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        outputs: &dyn OutputFactory,
        workers: ServiceWorkers,
    ) -> Self {
        let master_bpm = clamp_bpm(config.default_master_bpm);
        let decks = std::array::from_fn(|i| {
            let id = DeckId::new(i);
            Deck::new(
                id,
                DeckOutputs::create(outputs, id),
                Envelope::new(config.envelope.attack_ms, config.envelope.release_ms),
            )
        });
        let mut mixer = Mixer::new(config.mixer.crossfade_law);
        mixer.set_crossfade(0.5);
        let now = clock.now();

        let mut engine = Self {
            decks,
            registry: ClipRegistry::new(),
            renditions: RenditionCache::new(config.stretch.retention_per_clip),
            tempo_sync: TempoSync::default(),
            trigger: TriggerEngine::new(config.trigger.zero_crossing_window_ms),
            step_clock: StepClock::new(master_bpm, config.sequencer.catch_up_clamp),
            mixer,
            router: ControlRouter::with_defaults(),
            workers,
            rendition_dir: rendition_dir(&config.stretch),
            banks: Default::default(),
            current_bank: 0,
            master_bpm,
            tap_times: VecDeque::with_capacity(TAP_HISTORY),
            stutters: [None; NUM_DECKS],
            stutter_ms: config.trigger.stutter_ms.max(1),
            transport_origin: now,
            analysis_generation: 0,
            analysis_jobs: HashMap::new(),
            clock,
            config,
        };
        engine.push_volumes();

        let swept = sweep_rendition_dir(&engine.rendition_dir);
        if swept > 0 {
            log::info!(
                "[CONTROL] Removed {} rendition(s) left by an earlier run from {:?}",
                swept,
                engine.rendition_dir
            );
        }
        engine
    }

    // ─────────────────────────────────────────────────────────────
    // Command dispatch
    // ─────────────────────────────────────────────────────────────

    /// Apply one command
    pub fn apply(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Input(event) => self.handle_input(&event),
            EngineCommand::BindKey { action, code } => self.router.bind_key(action, code),
            EngineCommand::BindMidi { action, binding } => match binding {
                Some(binding) => self.router.bind_midi(action, binding),
                None => self.router.unbind_midi(action),
            },

            EngineCommand::LoadClip { deck, path } => self.load_clip(deck, &path),
            EngineCommand::UnloadClip { deck } => self.unload_clip(deck),
            EngineCommand::AssignPad { bank, deck, path } => self.assign_pad(bank, deck, path),
            EngineCommand::SwitchBank { bank } => self.switch_bank(bank),

            EngineCommand::TogglePlay => self.toggle_play(),
            EngineCommand::Trigger { deck, position_ms } => {
                self.trigger(deck, position_ms);
            }
            EngineCommand::Release { deck } => self.release(deck),
            EngineCommand::StutterPress { deck } => self.stutter_press(deck),
            EngineCommand::SlipPress { deck } => self.slip_press(deck),
            EngineCommand::StutterRelease { deck } => self.stutter_release(deck),
            EngineCommand::SetStutterSize { ms } => self.set_stutter_size(ms),
            EngineCommand::Seek { deck, position_ms } => self.decks[deck.0].seek(position_ms),
            EngineCommand::SetLooping { deck, looping } => self.set_looping(deck, looping),

            EngineCommand::SetMasterBpm { bpm } => self.set_master_bpm(bpm),
            EngineCommand::NudgeBpm { delta } => self.nudge_bpm(delta),
            EngineCommand::TapTempo => self.tap_tempo(),
            EngineCommand::SetSyncEnabled { enabled } => self.set_sync_enabled(enabled),
            EngineCommand::AlignPhase => self.align_phase(),

            EngineCommand::ToggleSequencer => self.toggle_sequencer(),
            EngineCommand::SetSeqRate { rate } => self.set_seq_rate(rate),
            EngineCommand::SetStep {
                deck,
                step,
                position,
            } => self.set_step(deck, step, position),
            EngineCommand::SetLoopWindow {
                deck,
                start,
                length,
            } => self.set_loop_window(deck, start, length),
            EngineCommand::Quantize => self.quantize(),

            EngineCommand::HotCue { slot } => self.hot_cue(slot),
            EngineCommand::ClearHotCue { slot } => self.clear_hot_cue(slot),

            EngineCommand::SetCrossfade { value } => self.set_crossfade(value),
            EngineCommand::SetFader { deck, value } => self.set_fader(deck, value),
            EngineCommand::ToggleMute { deck } => self.toggle_mute(deck),
            EngineCommand::SetCrossfadeSide { deck, side } => self.set_crossfade_side(deck, side),
            EngineCommand::SetCue { deck, enabled } => self.decks[deck.0].set_cue_enabled(enabled),

            EngineCommand::Shutdown => log::debug!("[CONTROL] Shutdown reached the engine, ignoring"),
        }
    }

    /// Resolve a key or MIDI event through the router and act on it
    pub fn handle_input(&mut self, event: &InputEvent) {
        if let Some(routed) = self.router.route(event) {
            self.handle_action(routed.action, routed.value);
        }
    }

    fn handle_action(&mut self, action: Action, value: ControlValue) {
        if action.is_continuous() {
            let v = value.as_unit() as f32;
            match action {
                Action::Fader(deck) => self.set_fader(deck, v),
                Action::Crossfader => self.set_crossfade(v),
                _ => {}
            }
            return;
        }

        let pressed = value.is_press();
        if action.is_momentary() {
            match action {
                Action::Stutter(deck) if pressed => self.stutter_press(deck),
                Action::Slip(deck) if pressed => self.slip_press(deck),
                Action::Stutter(deck) | Action::Slip(deck) => self.stutter_release(deck),
                _ => {}
            }
            return;
        }
        if !pressed {
            return;
        }

        match action {
            Action::PlayPause => self.toggle_play(),
            Action::ToggleSequencer => self.toggle_sequencer(),
            Action::TapTempo => self.tap_tempo(),
            Action::NudgeUp => self.nudge_bpm(NUDGE_STEP_BPM),
            Action::NudgeDown => self.nudge_bpm(-NUDGE_STEP_BPM),
            Action::ToggleSync => self.set_sync_enabled(!self.tempo_sync.is_enabled()),
            Action::AlignPhase => self.align_phase(),
            Action::SeqRate(rate) => self.set_seq_rate(rate),
            Action::Bank(bank) => self.switch_bank(bank),
            Action::Quantize => self.quantize(),
            Action::HotCue(slot) => self.hot_cue(slot),
            Action::HotCueClear(slot) => self.clear_hot_cue(slot),
            Action::StutterSize(ms) => self.set_stutter_size(ms),
            Action::Trigger(deck) => {
                self.trigger(deck, 0);
            }
            Action::Mute(deck) => self.toggle_mute(deck),
            Action::Cue(deck) => {
                let enabled = !self.decks[deck.0].cue_enabled();
                self.decks[deck.0].set_cue_enabled(enabled);
            }
            Action::Stutter(_) | Action::Slip(_) | Action::Fader(_) | Action::Crossfader => {}
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Worker results
    // ─────────────────────────────────────────────────────────────

    /// Channel the control thread selects on
    pub fn result_receiver(&self) -> Receiver<ServiceResult> {
        self.workers.result_receiver()
    }

    pub fn handle_service_result(&mut self, result: ServiceResult) {
        match result {
            ServiceResult::Analysis(outcome) => self.handle_analysis(outcome),
            ServiceResult::Stretch(outcome) => self.handle_stretch(outcome),
        }
    }

    fn handle_analysis(&mut self, outcome: AnalysisOutcome) {
        let AnalysisOutcome {
            id,
            clip,
            path,
            generation,
            result,
        } = outcome;

        if self.analysis_jobs.get(&clip).is_some_and(|h| h.id == id) {
            self.analysis_jobs.remove(&clip);
        }
        if generation != self.analysis_generation {
            log::debug!(
                "[CONTROL] Dropping analysis of {:?} from generation {} (now {})",
                path,
                generation,
                self.analysis_generation
            );
            return;
        }

        let stored = match result {
            Ok(analysis) => self
                .registry
                .set_analysis(clip, analysis.metadata, Some(analysis.audio)),
            Err(e) if e.is_cancelled() => {
                log::debug!("[CONTROL] Analysis of {:?} cancelled", path);
                return;
            }
            Err(e) => {
                log::info!("[CONTROL] {:?} stays inert after failed analysis: {}", path, e);
                self.registry
                    .set_analysis(clip, ClipMetadata::fallback(&path), None)
            }
        };
        if !stored {
            return;
        }

        for deck in DeckId::all() {
            if self.decks[deck.0].clip() == Some(clip) {
                self.apply_media_info(deck);
                self.apply_sync(deck);
            }
        }
    }

    fn handle_stretch(&mut self, outcome: StretchOutcome) {
        let StretchOutcome {
            clip,
            generation,
            ratio,
            result,
            ..
        } = outcome;

        if !self.tempo_sync.is_current(clip, generation) {
            log::debug!(
                "[CONTROL] Dropping stale rendition of {} at {:.3}x (gen {}, now {})",
                clip,
                ratio,
                generation,
                self.tempo_sync.generation(clip)
            );
            if let Ok(path) = result {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::debug!("[CONTROL] Could not delete stale rendition {:?}: {}", path, e);
                }
            }
            return;
        }

        match result {
            Ok(path) => {
                self.tempo_sync.accept(clip, generation);
                let rendition = self.renditions.publish(clip, ratio, generation, path);
                for deck in self.decks.iter_mut().filter(|d| d.clip() == Some(clip)) {
                    if deck.swap_rendition(rendition.clone()) {
                        log::info!(
                            "[CONTROL] {} switched to pitch-corrected audio at {:.3}x",
                            deck.id(),
                            ratio
                        );
                    }
                }
                self.renditions.reclaim(clip);
            }
            Err(e) if e.is_cancelled() => {
                log::debug!("[CONTROL] Render of {} at {:.3}x cancelled", clip, ratio);
            }
            Err(e) => {
                self.tempo_sync.fail(clip, generation);
                log::warn!(
                    "[CONTROL] Pitch correction of {} at {:.3}x failed, staying pitch-shifted: {}",
                    clip,
                    ratio,
                    e
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Timer ticks
    // ─────────────────────────────────────────────────────────────

    pub fn envelope_tick(&self) -> Duration {
        Duration::from_millis(self.config.envelope.tick_ms.max(1))
    }

    pub fn step_poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.sequencer.poll_ms.max(1))
    }

    /// Advance every deck's envelope by one tick
    pub fn tick_envelopes(&mut self) {
        let tick_ms = self.config.envelope.tick_ms as f64;
        for deck in self.decks.iter_mut() {
            if deck.tick_envelope(tick_ms) {
                log::trace!("{} released", deck.id());
            }
        }
    }

    /// Fire the steps that became due. Returns the number of triggers.
    pub fn poll_step_clock(&mut self) -> usize {
        let due = self.step_clock.poll(self.clock.now());
        let mut fired = 0;
        for _ in due {
            for deck in DeckId::all() {
                if self.advance_step(deck) {
                    fired += 1;
                }
            }
        }
        fired
    }

    /// Jump held stutters back to their cue. Returns the number of jumps.
    pub fn poll_stutters(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        for deck in DeckId::all() {
            let Some(cue) = self.stutters[deck.0]
                .as_mut()
                .and_then(|s| s.poll(now).then_some(s.cue_ms()))
            else {
                continue;
            };
            if self.trigger(deck, cue).is_some() {
                fired += 1;
            }
        }
        fired
    }

    fn advance_step(&mut self, deck: DeckId) -> bool {
        let d = &self.decks[deck.0];
        if !d.is_playable() {
            return false;
        }
        let Some(entry) = d.clip().and_then(|c| self.registry.get(c)) else {
            return false;
        };
        if entry.pattern.is_empty() {
            return false;
        }
        let pointer = entry.loop_window.advance(d.step_pointer());
        let position = entry.pattern.get(pointer);
        let duration_ms = d.duration_ms();

        self.decks[deck.0].set_step_pointer(Some(pointer));
        match position {
            Some(pos) => self.trigger(deck, (pos * duration_ms as f64) as u64).is_some(),
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Clips and banks
    // ─────────────────────────────────────────────────────────────

    /// Bind a clip to a deck, analysing it first if needed
    pub fn load_clip(&mut self, deck: DeckId, path: &Path) {
        let clip = self.registry.intern(path);
        let looping = self.registry.get(clip).map(|c| c.looping).unwrap_or(true);
        self.stutters[deck.0] = None;
        let d = &mut self.decks[deck.0];
        d.set_looping(looping);
        d.load_clip(clip, path);

        if self.registry.is_analyzed(clip) {
            self.apply_media_info(deck);
            self.apply_sync(deck);
        } else if !self.analysis_jobs.contains_key(&clip) {
            let handle =
                self.workers
                    .submit_analysis(clip, path.to_path_buf(), self.analysis_generation);
            self.analysis_jobs.insert(clip, handle);
        }
        log::info!("[CONTROL] {} loaded {:?}", deck, path);
    }

    pub fn unload_clip(&mut self, deck: DeckId) {
        self.stutters[deck.0] = None;
        self.decks[deck.0].unload();
    }

    fn apply_media_info(&mut self, deck: DeckId) {
        let Some(entry) = self.decks[deck.0].clip().and_then(|c| self.registry.get(c)) else {
            return;
        };
        let duration_ms = entry.duration_ms();
        let base_audio = entry.audio.as_ref().and_then(|a| a.base_audio_path.clone());
        self.decks[deck.0].set_media_info(duration_ms, base_audio);
    }

    /// Set a pad, loading it right away if its bank is showing
    pub fn assign_pad(&mut self, bank: usize, deck: DeckId, path: Option<PathBuf>) {
        let Some(slots) = self.banks.get_mut(bank) else {
            log::warn!("[CONTROL] No bank {}", bank);
            return;
        };
        slots[deck.0] = path.clone();
        if bank == self.current_bank {
            match path {
                Some(path) => self.load_clip(deck, &path),
                None => self.unload_clip(deck),
            }
        }
    }

    /// Show another bank
    ///
    /// In-flight analyses are interrupted and their results will be dropped;
    /// clips of the new bank are analysed afresh if needed.
    pub fn switch_bank(&mut self, bank: usize) {
        if bank >= NUM_BANKS {
            log::warn!("[CONTROL] No bank {}", bank);
            return;
        }
        for (_, handle) in self.analysis_jobs.drain() {
            handle.interrupt();
        }
        self.analysis_generation += 1;
        self.current_bank = bank;
        log::info!(
            "[CONTROL] Bank {} (analysis generation {})",
            bank + 1,
            self.analysis_generation
        );

        let slots = self.banks[bank].clone();
        for (deck, slot) in DeckId::all().zip(slots) {
            match slot {
                Some(path) => self.load_clip(deck, &path),
                None => self.unload_clip(deck),
            }
        }
    }

    pub fn set_looping(&mut self, deck: DeckId, looping: bool) {
        self.decks[deck.0].set_looping(looping);
        if let Some(entry) = self.decks[deck.0]
            .clip()
            .and_then(|c| self.registry.get_mut(c))
        {
            entry.looping = looping;
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────

    fn clip_audio(&self, deck: DeckId) -> Option<Arc<ClipAudio>> {
        self.decks[deck.0]
            .clip()
            .and_then(|c| self.registry.get(c))
            .and_then(|e| e.audio.clone())
    }

    /// Click-free restart at a clip position. `None` for an inert deck.
    pub fn trigger(&mut self, deck: DeckId, position_ms: u64) -> Option<u64> {
        let audio = self.clip_audio(deck);
        self.trigger
            .trigger(&mut self.decks[deck.0], audio.as_deref(), position_ms)
    }

    pub fn release(&mut self, deck: DeckId) {
        self.trigger.release(&mut self.decks[deck.0]);
    }

    /// Retrigger at the current position and keep looping back to it
    pub fn stutter_press(&mut self, deck: DeckId) {
        self.start_stutter(deck, StutterMode::Retrigger);
    }

    /// Stutter that resumes the clip's own timeline on release
    pub fn slip_press(&mut self, deck: DeckId) {
        self.start_stutter(deck, StutterMode::Slip);
    }

    fn start_stutter(&mut self, deck: DeckId, mode: StutterMode) {
        if self.stutters[deck.0].is_some() {
            return;
        }
        let position = self.decks[deck.0].position_ms();
        let Some(cue) = self.trigger(deck, position) else {
            return;
        };
        self.stutters[deck.0] = Some(Stutter::start(mode, cue, self.stutter_ms, self.clock.now()));
        log::debug!("[CONTROL] {} stutter at {} ms every {} ms", deck, cue, self.stutter_ms);
    }

    /// End a held stutter
    ///
    /// A retrigger stutter fades out. A slip stutter jumps to where the clip
    /// would be had it played on, wrapping on looping clips; past the end of
    /// a one-shot clip it fades out instead.
    pub fn stutter_release(&mut self, deck: DeckId) {
        let Some(stutter) = self.stutters[deck.0].take() else {
            self.release(deck);
            return;
        };
        if stutter.mode() == StutterMode::Retrigger {
            self.release(deck);
            return;
        }

        let d = &self.decks[deck.0];
        let duration_ms = d.duration_ms();
        let position = stutter.slip_position_ms(self.clock.now(), d.playback_rate());
        if d.is_looping() && duration_ms > 0 {
            self.trigger(deck, position % duration_ms);
        } else if position < duration_ms {
            self.trigger(deck, position);
        } else {
            self.release(deck);
        }
    }

    /// Loop length of stutters, applied to held ones right away
    pub fn set_stutter_size(&mut self, ms: u64) {
        self.stutter_ms = ms.max(1);
        let now = self.clock.now();
        for stutter in self.stutters.iter_mut().flatten() {
            stutter.set_interval(self.stutter_ms, now);
        }
    }

    /// Fade out the playing decks, or resume all of them if none is playing
    pub fn toggle_play(&mut self) {
        if self.decks.iter().any(|d| d.is_playing()) {
            for deck in self.decks.iter_mut().filter(|d| d.is_playing()) {
                deck.release();
            }
        } else {
            for deck in self.decks.iter_mut().filter(|d| d.is_playable()) {
                deck.play();
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Tempo
    // ─────────────────────────────────────────────────────────────

    pub fn master_bpm(&self) -> f64 {
        self.master_bpm
    }

    /// Set the master tempo and resync every loaded deck
    pub fn set_master_bpm(&mut self, bpm: f64) {
        if !bpm.is_finite() {
            return;
        }
        self.master_bpm = clamp_bpm(bpm);
        self.step_clock.set_tempo(self.master_bpm, self.clock.now());
        log::debug!("[CONTROL] Master tempo {:.1} BPM", self.master_bpm);
        self.resync_all();
    }

    pub fn nudge_bpm(&mut self, delta: f64) {
        self.set_master_bpm(round_tenth(self.master_bpm + delta));
    }

    /// Register a tap. From the second tap on, the master tempo follows the
    /// average interval of the last few taps.
    pub fn tap_tempo(&mut self) {
        let now = self.clock.now();
        if self
            .tap_times
            .back()
            .is_some_and(|&last| now.saturating_sub(last) > TAP_RESET)
        {
            self.tap_times.clear();
        }
        self.tap_times.push_back(now);
        while self.tap_times.len() > TAP_HISTORY {
            self.tap_times.pop_front();
        }

        if let Some(bpm) = tap_bpm(&self.tap_times) {
            self.set_master_bpm(round_tenth(bpm));
        }
    }

    pub fn set_sync_enabled(&mut self, enabled: bool) {
        self.tempo_sync.set_enabled(enabled);
        log::info!("[CONTROL] Tempo sync {}", if enabled { "on" } else { "off" });
        self.resync_all();
    }

    fn resync_all(&mut self) {
        for deck in DeckId::all() {
            self.apply_sync(deck);
        }
    }

    /// Instant phase, then the corrected phase if a render is needed
    fn apply_sync(&mut self, deck: DeckId) {
        let Some(clip) = self.decks[deck.0].clip() else {
            return;
        };
        let clip_bpm = self.registry.get(clip).and_then(|c| c.tempo_bpm());
        let ratio = self.tempo_sync.target_ratio(self.master_bpm, clip_bpm);
        self.decks[deck.0].set_instant_rate(ratio);
        self.request_rendition(clip, ratio);
    }

    fn request_rendition(&mut self, clip: ClipId, ratio: f64) {
        let new_generation = self.tempo_sync.retarget(clip, ratio);
        if is_unity(ratio) {
            return;
        }

        if let Some(rendition) = self.renditions.lookup(clip, ratio) {
            self.tempo_sync.mark_ready(clip);
            for deck in self.decks.iter_mut().filter(|d| d.clip() == Some(clip)) {
                deck.swap_rendition(rendition.clone());
            }
            return;
        }

        // Same ratio as before: a render is already pending, or it failed
        let Some(generation) = new_generation else {
            return;
        };
        let Some(source) = self
            .registry
            .get(clip)
            .and_then(|e| e.audio.as_ref())
            .and_then(|a| a.base_audio_path.clone())
        else {
            log::debug!("[CONTROL] {} has no base audio, instant sync only", clip);
            return;
        };
        if !self.workers.can_stretch() {
            return;
        }

        let output = self
            .rendition_dir
            .join(rendition_file_name(&source, ratio, generation));
        if let Some(handle) = self
            .workers
            .submit_stretch(clip, generation, ratio, source, output)
        {
            self.tempo_sync.set_pending(clip, generation, handle);
        }
    }

    /// Seek every playing deck onto the transport's beat phase
    pub fn align_phase(&mut self) {
        if !(self.master_bpm > 0.0) {
            return;
        }
        let beat_ms = 60_000.0 / self.master_bpm;
        let elapsed_ms = self
            .clock
            .now()
            .saturating_sub(self.transport_origin)
            .as_secs_f64()
            * 1000.0;
        let phase = elapsed_ms % beat_ms;

        for deck in self.decks.iter_mut().filter(|d| d.is_playing()) {
            let target = phase_aligned_position(deck.position_ms(), phase, beat_ms);
            deck.seek(target);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Sequencer
    // ─────────────────────────────────────────────────────────────

    pub fn toggle_sequencer(&mut self) {
        if self.step_clock.is_running() {
            self.step_clock.stop();
            log::info!("[CONTROL] Sequencer stopped");
            return;
        }
        let now = self.clock.now();
        for deck in self.decks.iter_mut() {
            deck.set_step_pointer(None);
        }
        self.transport_origin = now;
        self.step_clock.start(now);
        log::info!("[CONTROL] Sequencer started at {:.1} BPM", self.master_bpm);
    }

    pub fn set_seq_rate(&mut self, rate: SeqRate) {
        self.step_clock.set_rate(rate, self.clock.now());
    }

    /// Edit the pattern of the clip on `deck`
    pub fn set_step(&mut self, deck: DeckId, step: u32, position: Option<f64>) {
        let Some(entry) = self.decks[deck.0]
            .clip()
            .and_then(|c| self.registry.get_mut(c))
        else {
            return;
        };
        match position {
            Some(pos) => {
                entry.pattern.set(step, pos);
            }
            None => {
                entry.pattern.remove(step);
            }
        }
    }

    pub fn set_loop_window(&mut self, deck: DeckId, start: u32, length: u32) {
        if let Some(entry) = self.decks[deck.0]
            .clip()
            .and_then(|c| self.registry.get_mut(c))
        {
            entry.loop_window = LoopWindow::new(start, length);
        }
    }

    /// Snap the patterns of the current bank's clips to the quantize grid
    pub fn quantize(&mut self) {
        let grid = self.config.sequencer.quantize_grid;
        for path in self.banks[self.current_bank].iter().flatten() {
            if let Some(entry) = self
                .registry
                .id_of(path)
                .and_then(|id| self.registry.get_mut(id))
            {
                entry.pattern.quantize(grid);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Hot cues
    // ─────────────────────────────────────────────────────────────

    /// Jump to a hot cue on the dominant deck, or store one there
    pub fn hot_cue(&mut self, slot: u8) {
        let deck = self.mixer.dominant_deck();
        let d = &self.decks[deck.0];
        let Some(clip) = d.clip().filter(|_| d.is_playable()) else {
            return;
        };
        match self.registry.hot_cue(clip, slot) {
            Some(position) => {
                self.trigger(deck, position);
            }
            None => {
                let audio = self.clip_audio(deck);
                let position = self
                    .trigger
                    .find_zero_crossing(audio.as_deref(), self.decks[deck.0].position_ms());
                if self.registry.set_hot_cue(clip, slot, position) {
                    log::info!("[CONTROL] Hot cue {} on {} set at {} ms", slot, deck, position);
                }
            }
        }
    }

    pub fn clear_hot_cue(&mut self, slot: u8) {
        let deck = self.mixer.dominant_deck();
        if let Some(clip) = self.decks[deck.0].clip() {
            self.registry.clear_hot_cue(clip, slot);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mixer
    // ─────────────────────────────────────────────────────────────

    pub fn set_crossfade(&mut self, value: f32) {
        self.mixer.set_crossfade(value);
        self.push_volumes();
    }

    pub fn set_fader(&mut self, deck: DeckId, value: f32) {
        self.mixer.set_fader(deck, value);
        self.push_volumes();
    }

    pub fn toggle_mute(&mut self, deck: DeckId) {
        let muted = self.mixer.toggle_mute(deck);
        log::debug!("[CONTROL] {} {}", deck, if muted { "muted" } else { "unmuted" });
        self.push_volumes();
    }

    pub fn set_crossfade_side(&mut self, deck: DeckId, side: CrossfadeSide) {
        self.mixer.set_side(deck, side);
        self.push_volumes();
    }

    fn push_volumes(&mut self) {
        let volumes = self.mixer.volumes();
        for (deck, volume) in self.decks.iter_mut().zip(volumes) {
            deck.set_volume(volume);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────

    /// Restore banks, per-clip settings, bindings and tempo, then show bank 1
    pub fn apply_session(&mut self, session: &Session) {
        self.banks = session.banks.clone();

        for (path, settings) in &session.clips {
            let clip = self.registry.intern(path);
            if let Some(entry) = self.registry.get_mut(clip) {
                entry.pattern = settings.pattern.clone();
                entry.loop_window = settings.loop_window;
                entry.hot_cues = settings.hot_cues.clone();
                if let Some(looping) = settings.looping {
                    entry.looping = looping;
                }
            }
        }

        let mut router = ControlRouter::with_defaults();
        for &(action, code) in &session.keys {
            router.bind_key(action, code);
        }
        for &(action, binding) in &session.midi {
            match binding {
                Some(binding) => router.bind_midi(action, binding),
                None => router.unbind_midi(action),
            }
        }
        self.router = router;

        if let Some(bpm) = session.master_bpm {
            self.set_master_bpm(bpm);
        }
        self.switch_bank(0);
    }

    /// Snapshot everything a session persists
    pub fn to_session(&self) -> Session {
        let mut session = Session {
            banks: self.banks.clone(),
            master_bpm: Some(self.master_bpm),
            ..Default::default()
        };

        for (_, entry) in self.registry.iter() {
            let settings = session.clip_mut(&entry.path);
            settings.pattern = entry.pattern.clone();
            settings.loop_window = entry.loop_window;
            settings.hot_cues = entry.hot_cues.clone();
            settings.looping = (!entry.looping).then_some(false);
        }
        session.prune();

        for (action, binding) in self.router.bindings() {
            match binding {
                Binding::Key(code) => session.keys.push((action, *code)),
                Binding::Midi(midi) => session.midi.push((action, Some(*midi))),
            }
        }
        session
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Interrupt outstanding jobs, wait for them boundedly, and clean up
    /// unreferenced renditions
    pub fn shutdown_workers(&mut self) {
        let timeout = Duration::from_millis(self.config.workers.shutdown_timeout_ms);
        if !self.workers.shutdown(timeout) {
            log::warn!("[CONTROL] Workers did not drain within {:?}", timeout);
        }
        let removed = self.renditions.reclaim_all();
        if removed > 0 {
            log::debug!("[CONTROL] Reclaimed {} rendition(s)", removed);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn deck(&self, deck: DeckId) -> &Deck {
        &self.decks[deck.0]
    }

    pub fn registry(&self) -> &ClipRegistry {
        &self.registry
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn router(&self) -> &ControlRouter {
        &self.router
    }

    pub fn step_clock(&self) -> &StepClock {
        &self.step_clock
    }

    pub fn tempo_sync(&self) -> &TempoSync {
        &self.tempo_sync
    }

    pub fn renditions(&self) -> &RenditionCache {
        &self.renditions
    }

    pub fn stutter(&self, deck: DeckId) -> Option<&Stutter> {
        self.stutters[deck.0].as_ref()
    }

    pub fn stutter_ms(&self) -> u64 {
        self.stutter_ms
    }

    pub fn current_bank(&self) -> usize {
        self.current_bank
    }

    pub fn bank(&self, bank: usize) -> Option<&BankSlots> {
        self.banks.get(bank)
    }

    pub fn analysis_generation(&self) -> u64 {
        self.analysis_generation
    }
}

fn clamp_bpm(bpm: f64) -> f64 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Tempo from the mean interval between taps
fn tap_bpm(taps: &VecDeque<Duration>) -> Option<f64> {
    let first = taps.front()?;
    let last = taps.back()?;
    if taps.len() < 2 {
        return None;
    }
    let avg = last.saturating_sub(*first).as_secs_f64() / (taps.len() - 1) as f64;
    (avg > 0.0).then(|| 60.0 / avg)
}

/// Position that puts a deck on the transport's beat phase
///
/// The correction is wrapped into `±beat/2` so a deck never jumps by more
/// than half a beat.
fn phase_aligned_position(position_ms: u64, transport_phase_ms: f64, beat_ms: f64) -> u64 {
    let mut diff = transport_phase_ms - (position_ms as f64 % beat_ms);
    if diff < -beat_ms / 2.0 {
        diff += beat_ms;
    } else if diff > beat_ms / 2.0 {
        diff -= beat_ms;
    }
    (position_ms as f64 + diff).max(0.0) as u64
}
