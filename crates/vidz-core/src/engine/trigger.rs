//! Click-free (re)starts
//!
//! A trigger restarts a deck at an arbitrary point. To avoid clicks the
//! position is moved to the quietest nearby sample, the outputs are muted
//! across the seek and the envelope ramps the level back in.

use super::deck::Deck;
use crate::clip::ClipAudio;

#[derive(Debug, Clone)]
pub struct TriggerEngine {
    /// Half-width of the zero-crossing search
    window_ms: f64,
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new(20.0)
    }
}

impl TriggerEngine {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms: window_ms.max(0.0),
        }
    }

    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }

    /// Quietest sample position within `±window` of `requested_ms`
    ///
    /// Scans the half-open window `[idx - w, idx + w)` for the smallest
    /// absolute amplitude; the earliest of equal minima wins. Without sample
    /// data, or when the window falls outside the audio, the requested
    /// position is returned unchanged.
    pub fn find_zero_crossing(&self, audio: Option<&ClipAudio>, requested_ms: u64) -> u64 {
        let Some(audio) = audio.filter(|a| !a.is_empty()) else {
            return requested_ms;
        };
        let idx = audio.sample_index(requested_ms as f64);
        let half = audio.sample_index(self.window_ms);
        let start = idx.saturating_sub(half);
        let end = idx.saturating_add(half).min(audio.samples.len());
        if start >= end {
            return requested_ms;
        }

        let mut best = start;
        let mut best_amp = f32::INFINITY;
        for (i, sample) in audio.samples[start..end].iter().enumerate() {
            let amp = sample.abs();
            if amp < best_amp {
                best_amp = amp;
                best = start + i;
            }
        }
        audio.position_ms(best)
    }

    /// Trigger `deck` at `requested_ms` (clip timeline)
    ///
    /// Returns the position actually used, or `None` for a deck without a
    /// playable clip.
    pub fn trigger(&self, deck: &mut Deck, audio: Option<&ClipAudio>, requested_ms: u64) -> Option<u64> {
        if !deck.is_playable() {
            return None;
        }
        let clamped = requested_ms.min(deck.duration_ms().saturating_sub(1));
        let safe = self
            .find_zero_crossing(audio, clamped)
            .min(deck.duration_ms().saturating_sub(1));
        deck.restart_at(safe);
        log::trace!("{} triggered at {} ms (requested {})", deck.id(), safe, requested_ms);
        Some(safe)
    }

    /// Let go of a held trigger
    pub fn release(&self, deck: &mut Deck) {
        deck.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::deck::tests::{loaded_deck, sim_deck};
    use crate::engine::envelope::EnvelopeState;
    use std::sync::Arc;

    /// 1 kHz sample rate so indices read as milliseconds
    fn audio_with_quiet_at(len: usize, quiet: &[usize]) -> ClipAudio {
        let mut samples = vec![0.8f32; len];
        for &i in quiet {
            samples[i] = 0.01;
        }
        ClipAudio {
            samples,
            sample_rate: 1000,
            base_audio_path: None,
        }
    }

    #[test]
    fn test_finds_quietest_sample_in_window() {
        let engine = TriggerEngine::new(20.0);
        let audio = audio_with_quiet_at(1000, &[490]);
        assert_eq!(engine.find_zero_crossing(Some(&audio), 500), 490);
    }

    #[test]
    fn test_first_minimum_wins() {
        let engine = TriggerEngine::new(20.0);
        let audio = audio_with_quiet_at(1000, &[485, 510]);
        assert_eq!(engine.find_zero_crossing(Some(&audio), 500), 485);
    }

    #[test]
    fn test_window_is_half_open() {
        let engine = TriggerEngine::new(20.0);
        // 520 is just outside [480, 520)
        let audio = audio_with_quiet_at(1000, &[520]);
        assert_eq!(engine.find_zero_crossing(Some(&audio), 500), 480);
    }

    #[test]
    fn test_no_audio_keeps_request() {
        let engine = TriggerEngine::default();
        assert_eq!(engine.find_zero_crossing(None, 1234), 1234);
        assert_eq!(engine.find_zero_crossing(Some(&ClipAudio::default()), 1234), 1234);
        let audio = audio_with_quiet_at(100, &[]);
        assert_eq!(engine.find_zero_crossing(Some(&audio), 5000), 5000);
    }

    #[test]
    fn test_trigger_starts_attack_from_silence() {
        let clock = Arc::new(ManualClock::new());
        let mut deck = loaded_deck(clock, 8000);
        let engine = TriggerEngine::default();

        assert_eq!(engine.trigger(&mut deck, None, 5000), Some(5000));
        assert!(deck.is_playing());
        assert_eq!(deck.position_ms(), 5000);
        assert_eq!(deck.envelope_state(), EnvelopeState::Attack);
        assert_eq!(deck.envelope().level(), 0.0);
        assert!(!deck.main_audio().is_muted());
    }

    #[test]
    fn test_trigger_clamps_to_duration() {
        let clock = Arc::new(ManualClock::new());
        let mut deck = loaded_deck(clock, 8000);
        let engine = TriggerEngine::default();
        assert_eq!(engine.trigger(&mut deck, None, 20_000), Some(7999));
    }

    #[test]
    fn test_trigger_on_inert_deck_is_noop() {
        let clock = Arc::new(ManualClock::new());
        let engine = TriggerEngine::default();

        let mut empty = sim_deck(clock.clone());
        assert_eq!(engine.trigger(&mut empty, None, 0), None);

        let mut corrupt = loaded_deck(clock, 0);
        assert_eq!(engine.trigger(&mut corrupt, None, 0), None);
        assert!(!corrupt.is_playing());
    }

    #[test]
    fn test_trigger_maps_audio_under_tempo_sync() {
        let clock = Arc::new(ManualClock::new());
        let mut deck = loaded_deck(clock, 10_000);
        let engine = TriggerEngine::default();
        deck.set_instant_rate(1.2);

        engine.trigger(&mut deck, None, 5000);
        assert_eq!(deck.main_audio().position_ms(), 5000);
        assert_eq!(deck.main_audio().rate(), 1.2);
    }

    #[test]
    fn test_release_enters_release_state() {
        let clock = Arc::new(ManualClock::new());
        let mut deck = loaded_deck(clock, 8000);
        let engine = TriggerEngine::default();
        engine.trigger(&mut deck, None, 0);
        engine.release(&mut deck);
        assert_eq!(deck.envelope_state(), EnvelopeState::Release);
    }
}
