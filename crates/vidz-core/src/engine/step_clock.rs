//! Sequencer step clock
//!
//! Steps are 16th notes of the master tempo, scaled by the sequencer rate.
//! The due step is derived from elapsed time on every poll rather than by
//! counting timer callbacks, so a late or missed poll never drifts the grid.
//!
//! ```text
//! steps(now) = anchor_steps + elapsed_secs * bpm * 4 * multiplier / 60
//! ```
//!
//! Tempo and rate changes re-anchor: the fractional step position at the
//! moment of the change becomes the new origin.

use std::ops::Range;
use std::time::Duration;

use crate::types::SeqRate;

/// Guards `floor()` against values like 15.999999 that are exactly 16 on paper
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct StepClock {
    running: bool,
    bpm: f64,
    rate: SeqRate,
    /// Largest backlog fired by one poll
    catch_up_clamp: u64,
    anchor_time: Duration,
    anchor_steps: f64,
    /// Highest step handed out so far. `None` until the first poll after start.
    last_processed: Option<u64>,
}

impl StepClock {
    pub fn new(bpm: f64, catch_up_clamp: u64) -> Self {
        Self {
            running: false,
            bpm,
            rate: SeqRate::Normal,
            catch_up_clamp: catch_up_clamp.max(1),
            anchor_time: Duration::ZERO,
            anchor_steps: 0.0,
            last_processed: None,
        }
    }

    /// Start counting from step 0 at `now`
    pub fn start(&mut self, now: Duration) {
        self.running = true;
        self.anchor_time = now;
        self.anchor_steps = 0.0;
        self.last_processed = None;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn rate(&self) -> SeqRate {
        self.rate
    }

    pub fn last_processed_step(&self) -> Option<u64> {
        self.last_processed
    }

    /// Change tempo, keeping the current step position
    pub fn set_tempo(&mut self, bpm: f64, now: Duration) {
        self.reanchor(now);
        self.bpm = bpm;
    }

    /// Change the rate multiplier, keeping the current step position
    pub fn set_rate(&mut self, rate: SeqRate, now: Duration) {
        self.reanchor(now);
        self.rate = rate;
    }

    fn reanchor(&mut self, now: Duration) {
        if self.running {
            self.anchor_steps = self.steps_at(now);
        }
        self.anchor_time = now;
    }

    /// Fractional step position at `now`
    pub fn steps_at(&self, now: Duration) -> f64 {
        if !(self.bpm > 0.0) {
            return self.anchor_steps;
        }
        let secs = now.saturating_sub(self.anchor_time).as_secs_f64();
        self.anchor_steps + secs * self.bpm * 4.0 * self.rate.multiplier() / 60.0
    }

    /// Steps that became due since the last poll
    ///
    /// At most `catch_up_clamp` steps are returned; a longer backlog is
    /// skipped and only the current step fires.
    pub fn poll(&mut self, now: Duration) -> Range<u64> {
        if !self.running {
            return 0..0;
        }
        let total = (self.steps_at(now) + STEP_EPSILON).floor().max(0.0) as u64;
        let next = self.last_processed.map(|s| s + 1).unwrap_or(0);
        if total < next {
            return next..next;
        }

        let gap = total + 1 - next;
        let first = if gap > self.catch_up_clamp {
            log::debug!(
                "[CLOCK] Skipping {} steps after a stall, resuming at step {}",
                gap - 1,
                total
            );
            total
        } else {
            next
        };
        self.last_processed = Some(total);
        first..total + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_first_step_fires_at_start() {
        let mut clock = StepClock::new(120.0, 16);
        assert_eq!(clock.poll(ms(0)), 0..0);
        clock.start(ms(0));
        assert_eq!(clock.poll(ms(0)), 0..1);
        assert_eq!(clock.poll(ms(5)), 1..1);
        assert_eq!(clock.last_processed_step(), Some(0));
    }

    #[test]
    fn test_step_timing_at_120_bpm() {
        let mut clock = StepClock::new(120.0, 16);
        clock.start(ms(0));
        let mut fired = Vec::new();
        for t in (0..=2000).step_by(10) {
            fired.extend(clock.poll(ms(t)).map(|s| (s, t)));
        }
        // 8 steps per second
        assert_eq!(fired.len(), 17);
        assert_eq!(fired[16], (16, 2000));
        assert_eq!(fired[8], (8, 1000));
    }

    #[test]
    fn test_catch_up_clamp_skips_long_stall() {
        let mut clock = StepClock::new(120.0, 16);
        clock.start(ms(0));
        clock.poll(ms(0));

        // 1 s stall: 8 steps, under the clamp
        assert_eq!(clock.poll(ms(1000)), 1..9);

        // 60 s suspend: only the current step fires
        let range = clock.poll(ms(61_000));
        assert_eq!(range, 488..489);
    }

    #[test]
    fn test_tempo_change_reanchors() {
        let mut clock = StepClock::new(120.0, 16);
        clock.start(ms(0));
        clock.poll(ms(1000));
        clock.set_tempo(60.0, ms(1000));
        assert!((clock.steps_at(ms(1000)) - 8.0).abs() < 1e-9);
        // Half speed from here: 4 steps per second
        assert!((clock.steps_at(ms(2000)) - 12.0).abs() < 1e-9);
        assert_eq!(clock.poll(ms(2000)), 9..13);
    }

    #[test]
    fn test_rate_multiplier() {
        let mut clock = StepClock::new(120.0, 64);
        clock.set_rate(SeqRate::Double, ms(0));
        clock.start(ms(0));
        clock.poll(ms(0));
        assert_eq!(clock.poll(ms(1000)), 1..17);

        clock.set_rate(SeqRate::Half, ms(1000));
        assert_eq!(clock.poll(ms(2000)), 17..21);
    }

    #[test]
    fn test_monotonic_under_arbitrary_samples() {
        let clamp = 16;
        let mut clock = StepClock::new(133.0, clamp);
        clock.start(ms(0));
        let samples = [
            0u64, 3, 3, 250, 100, 90_000, 90_001, 89_000, 90_500, 400_000, 12, 400_010,
        ];
        let mut last = None;
        for &t in &samples {
            let range = clock.poll(ms(t));
            assert!(range.end - range.start <= clamp);
            let now = clock.last_processed_step();
            assert!(now >= last);
            if !range.is_empty() {
                assert_eq!(Some(range.end - 1), now);
            }
            last = now;
        }
    }

    #[test]
    fn test_restart_resets_progress() {
        let mut clock = StepClock::new(120.0, 16);
        clock.start(ms(0));
        clock.poll(ms(500));
        clock.stop();
        assert!(!clock.is_running());
        clock.start(ms(10_000));
        assert_eq!(clock.last_processed_step(), None);
        assert_eq!(clock.poll(ms(10_000)), 0..1);
    }
}
