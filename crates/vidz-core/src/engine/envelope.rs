//! Attack/release envelope applied to deck gain and opacity

/// Envelope phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeState {
    #[default]
    Idle,
    Attack,
    Sustain,
    Release,
}

/// What a tick changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeEvent {
    /// Still ramping, or nothing to do
    None,
    /// Attack reached full level
    Sustained,
    /// Release reached zero; the deck should pause
    Finished,
}

/// Linear attack/release envelope
///
/// `level` only rises during attack, holds during sustain and only falls
/// during release. It is kept within [0, 1] for any tick size and any
/// attack/release time, including zero (which ramps in a single tick).
#[derive(Debug, Clone)]
pub struct Envelope {
    state: EnvelopeState,
    level: f32,
    attack_ms: f64,
    release_ms: f64,
}

impl Envelope {
    pub fn new(attack_ms: f64, release_ms: f64) -> Self {
        Self {
            state: EnvelopeState::Idle,
            level: 0.0,
            attack_ms,
            release_ms,
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn set_times(&mut self, attack_ms: f64, release_ms: f64) {
        self.attack_ms = attack_ms;
        self.release_ms = release_ms;
    }

    /// Whether ticks currently change the level
    pub fn is_ramping(&self) -> bool {
        matches!(self.state, EnvelopeState::Attack | EnvelopeState::Release)
    }

    /// Restart from silence (used by triggers)
    pub fn start_attack(&mut self) {
        self.level = 0.0;
        self.state = EnvelopeState::Attack;
    }

    /// Ramp up from the current level (used when resuming from pause)
    pub fn resume(&mut self) {
        if matches!(self.state, EnvelopeState::Idle | EnvelopeState::Release) {
            self.state = EnvelopeState::Attack;
        }
    }

    /// Begin fading out. Only attack and sustain can be released.
    pub fn release(&mut self) {
        if matches!(self.state, EnvelopeState::Attack | EnvelopeState::Sustain) {
            self.state = EnvelopeState::Release;
        }
    }

    /// Drop to idle silence without ramping
    pub fn reset(&mut self) {
        self.state = EnvelopeState::Idle;
        self.level = 0.0;
    }

    /// Advance by one tick of `tick_ms`
    pub fn tick(&mut self, tick_ms: f64) -> EnvelopeEvent {
        match self.state {
            EnvelopeState::Attack => {
                self.level = (self.level + step(tick_ms, self.attack_ms)).min(1.0);
                if self.level >= 1.0 {
                    self.state = EnvelopeState::Sustain;
                    return EnvelopeEvent::Sustained;
                }
                EnvelopeEvent::None
            }
            EnvelopeState::Release => {
                self.level = (self.level - step(tick_ms, self.release_ms)).max(0.0);
                if self.level <= 0.0 {
                    self.state = EnvelopeState::Idle;
                    return EnvelopeEvent::Finished;
                }
                EnvelopeEvent::None
            }
            EnvelopeState::Idle | EnvelopeState::Sustain => EnvelopeEvent::None,
        }
    }
}

/// Level change per tick. Zero-length ramps take one tick.
fn step(tick_ms: f64, ramp_ms: f64) -> f32 {
    if !(tick_ms > 0.0) {
        return 1.0;
    }
    let ramp = if ramp_ms > tick_ms && ramp_ms.is_finite() {
        ramp_ms
    } else {
        tick_ms
    };
    (tick_ms / ramp) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_then_sustain() {
        let mut env = Envelope::new(10.0, 10.0);
        env.start_attack();
        assert_eq!(env.tick(5.0), EnvelopeEvent::None);
        assert!((env.level() - 0.5).abs() < 1e-6);
        assert_eq!(env.tick(5.0), EnvelopeEvent::Sustained);
        assert_eq!(env.state(), EnvelopeState::Sustain);
        assert_eq!(env.level(), 1.0);
        assert_eq!(env.tick(5.0), EnvelopeEvent::None);
        assert_eq!(env.level(), 1.0);
    }

    #[test]
    fn test_release_to_idle() {
        let mut env = Envelope::new(10.0, 20.0);
        env.start_attack();
        env.tick(5.0);
        env.release();
        assert_eq!(env.state(), EnvelopeState::Release);
        // 0.5 - 0.25 per tick
        assert_eq!(env.tick(5.0), EnvelopeEvent::None);
        assert_eq!(env.tick(5.0), EnvelopeEvent::Finished);
        assert_eq!(env.state(), EnvelopeState::Idle);
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn test_zero_times_take_one_tick() {
        let mut env = Envelope::new(0.0, 0.0);
        env.start_attack();
        assert_eq!(env.tick(5.0), EnvelopeEvent::Sustained);
        env.release();
        assert_eq!(env.tick(5.0), EnvelopeEvent::Finished);
    }

    #[test]
    fn test_release_ignored_when_idle() {
        let mut env = Envelope::new(10.0, 10.0);
        env.release();
        assert_eq!(env.state(), EnvelopeState::Idle);
    }

    #[test]
    fn test_level_stays_in_bounds() {
        let configs = [(0.0, 0.0), (1.0, 1.0), (3.0, 7.0), (10.0, 10.0), (1000.0, 0.5)];
        let ticks = [0.0, 1.0, 5.0, 13.0, 250.0];
        for &(attack, release) in &configs {
            for &tick in &ticks {
                let mut env = Envelope::new(attack, release);
                let mut prev = env.level();
                env.start_attack();
                for _ in 0..500 {
                    env.tick(tick);
                    assert!((0.0..=1.0).contains(&env.level()));
                    assert!(env.level() >= prev || env.state() == EnvelopeState::Sustain);
                    prev = env.level();
                }
                env.release();
                for _ in 0..500 {
                    env.tick(tick);
                    assert!((0.0..=1.0).contains(&env.level()));
                    assert!(env.level() <= prev);
                    prev = env.level();
                }
                assert_eq!(env.state(), EnvelopeState::Idle);
            }
        }
    }

    #[test]
    fn test_resume_keeps_level() {
        let mut env = Envelope::new(10.0, 10.0);
        env.start_attack();
        env.tick(10.0);
        env.release();
        env.tick(5.0);
        let level = env.level();
        env.resume();
        assert_eq!(env.state(), EnvelopeState::Attack);
        assert_eq!(env.level(), level);
    }
}
