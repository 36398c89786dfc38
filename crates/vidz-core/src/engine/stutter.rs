//! Held stutters
//!
//! While a stutter control is held the deck jumps back to the cue point it
//! was pressed at, once per interval. Two flavours:
//!
//! - [`StutterMode::Retrigger`]: letting go fades the deck out, like any
//!   other held trigger.
//! - [`StutterMode::Slip`]: letting go resumes the clip where it would have
//!   been had it kept playing through the stutter.
//!
//! The timer is polled from the control thread's step tick, so its
//! resolution is the sequencer poll interval.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StutterMode {
    Retrigger,
    Slip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stutter {
    mode: StutterMode,
    cue_ms: u64,
    started: Duration,
    interval: Duration,
    next_fire: Duration,
}

impl Stutter {
    /// Start at `now`. The first jump back happens one interval later.
    pub fn start(mode: StutterMode, cue_ms: u64, interval_ms: u64, now: Duration) -> Self {
        let interval = Duration::from_millis(interval_ms.max(1));
        Self {
            mode,
            cue_ms,
            started: now,
            interval,
            next_fire: now.saturating_add(interval),
        }
    }

    pub fn mode(&self) -> StutterMode {
        self.mode
    }

    pub fn cue_ms(&self) -> u64 {
        self.cue_ms
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a jump is due. Several missed intervals count as one jump.
    pub fn poll(&mut self, now: Duration) -> bool {
        if now < self.next_fire {
            return false;
        }
        let interval_ns = self.interval.as_nanos();
        let missed = (now - self.next_fire).as_nanos() / interval_ns;
        let next_ns = self.next_fire.as_nanos() + interval_ns * (missed + 1);
        self.next_fire = Duration::from_nanos(u64::try_from(next_ns).unwrap_or(u64::MAX));
        true
    }

    /// Change the loop length. The next jump comes one new interval from now.
    pub fn set_interval(&mut self, interval_ms: u64, now: Duration) {
        self.interval = Duration::from_millis(interval_ms.max(1));
        self.next_fire = now.saturating_add(self.interval);
    }

    /// Clip position the deck would have reached without the stutter
    pub fn slip_position_ms(&self, now: Duration, rate: f64) -> u64 {
        let elapsed_ms = now.saturating_sub(self.started).as_secs_f64() * 1000.0;
        let advance = if rate.is_finite() { elapsed_ms * rate.max(0.0) } else { elapsed_ms };
        (self.cue_ms as f64 + advance).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_once_per_interval() {
        let mut stutter = Stutter::start(StutterMode::Retrigger, 1200, 250, ms(1000));
        assert!(!stutter.poll(ms(1000)));
        assert!(!stutter.poll(ms(1249)));
        assert!(stutter.poll(ms(1250)));
        assert!(!stutter.poll(ms(1260)));
        assert!(stutter.poll(ms(1500)));
        assert_eq!(stutter.cue_ms(), 1200);
    }

    #[test]
    fn test_missed_intervals_collapse() {
        let mut stutter = Stutter::start(StutterMode::Retrigger, 0, 100, ms(0));
        assert!(stutter.poll(ms(1050)));
        assert!(!stutter.poll(ms(1099)));
        assert!(stutter.poll(ms(1100)));
    }

    #[test]
    fn test_interval_change_restarts_timer() {
        let mut stutter = Stutter::start(StutterMode::Retrigger, 0, 500, ms(0));
        stutter.set_interval(1000, ms(400));
        assert!(!stutter.poll(ms(500)));
        assert!(!stutter.poll(ms(1399)));
        assert!(stutter.poll(ms(1400)));
        assert_eq!(stutter.interval(), ms(1000));
    }

    #[test]
    fn test_slip_position_follows_rate() {
        let stutter = Stutter::start(StutterMode::Slip, 2000, 500, ms(3000));
        assert_eq!(stutter.slip_position_ms(ms(4000), 1.0), 3000);
        assert_eq!(stutter.slip_position_ms(ms(4000), 1.25), 3250);
        assert_eq!(stutter.slip_position_ms(ms(2000), 1.0), 2000);
        assert_eq!(stutter.mode(), StutterMode::Slip);
    }
}
