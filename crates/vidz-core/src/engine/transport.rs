//! Media output abstraction
//!
//! A deck drives three outputs: the video layer and two audio paths (main
//! and monitor/cue). The engine only needs transport-level control over
//! them, expressed by [`MediaTransport`]. Hosts plug in real players through
//! [`OutputFactory`]; [`SimTransport`] is a clock-driven stand-in used by the
//! headless player and by tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::types::DeckId;

/// What a transport is told to play
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSource {
    pub path: PathBuf,
    /// Length of the media's own timeline. 0 when unknown.
    pub duration_ms: u64,
}

/// Which of a deck's outputs a transport drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Video,
    MainAudio,
    MonitorAudio,
}

/// Transport control over one media output
///
/// Positions are in the source's own timeline. `level` is audio gain for
/// audio outputs and opacity for video.
pub trait MediaTransport: Send {
    fn set_source(&mut self, source: Option<MediaSource>);
    fn source_path(&self) -> Option<&Path>;

    fn position_ms(&self) -> u64;
    fn seek(&mut self, position_ms: u64);

    fn set_rate(&mut self, rate: f64);
    fn rate(&self) -> f64;

    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;

    fn set_looping(&mut self, looping: bool);

    fn set_level(&mut self, level: f32);
    fn level(&self) -> f32;

    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
}

/// Creates the outputs for each deck
pub trait OutputFactory {
    fn create(&self, deck: DeckId, kind: OutputKind) -> Box<dyn MediaTransport>;
}

/// Simulated transport whose position advances with a [`Clock`]
pub struct SimTransport {
    clock: Arc<dyn Clock>,
    source: Option<MediaSource>,
    /// Position at `anchor_time`
    anchor_pos_ms: f64,
    anchor_time: Duration,
    rate: f64,
    playing: bool,
    looping: bool,
    level: f32,
    muted: bool,
}

impl SimTransport {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let anchor_time = clock.now();
        Self {
            clock,
            source: None,
            anchor_pos_ms: 0.0,
            anchor_time,
            rate: 1.0,
            playing: false,
            looping: false,
            level: 1.0,
            muted: false,
        }
    }

    fn duration_ms(&self) -> f64 {
        self.source.as_ref().map(|s| s.duration_ms as f64).unwrap_or(0.0)
    }

    fn current_pos_ms(&self) -> f64 {
        let duration = self.duration_ms();
        if duration <= 0.0 {
            return 0.0;
        }
        let mut pos = self.anchor_pos_ms;
        if self.playing {
            let elapsed = self.clock.now().saturating_sub(self.anchor_time);
            pos += elapsed.as_secs_f64() * 1000.0 * self.rate;
        }
        if pos >= duration {
            if self.looping {
                pos % duration
            } else {
                duration
            }
        } else {
            pos
        }
    }

    /// Fold elapsed playback into the anchor
    fn rebase(&mut self) {
        self.anchor_pos_ms = self.current_pos_ms();
        self.anchor_time = self.clock.now();
    }
}

impl MediaTransport for SimTransport {
    fn set_source(&mut self, source: Option<MediaSource>) {
        self.source = source;
        self.playing = false;
        self.anchor_pos_ms = 0.0;
        self.anchor_time = self.clock.now();
    }

    fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().map(|s| s.path.as_path())
    }

    fn position_ms(&self) -> u64 {
        self.current_pos_ms() as u64
    }

    fn seek(&mut self, position_ms: u64) {
        self.anchor_pos_ms = (position_ms as f64).min(self.duration_ms());
        self.anchor_time = self.clock.now();
    }

    fn set_rate(&mut self, rate: f64) {
        self.rebase();
        self.rate = rate;
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn play(&mut self) {
        if self.source.is_none() {
            return;
        }
        self.rebase();
        self.playing = true;
    }

    fn pause(&mut self) {
        self.rebase();
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing && (self.looping || self.current_pos_ms() < self.duration_ms())
    }

    fn set_looping(&mut self, looping: bool) {
        self.rebase();
        self.looping = looping;
    }

    fn set_level(&mut self, level: f32) {
        self.level = level;
    }

    fn level(&self) -> f32 {
        self.level
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }
}

/// Builds [`SimTransport`]s sharing one clock
pub struct SimOutputs {
    clock: Arc<dyn Clock>,
}

impl SimOutputs {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl OutputFactory for SimOutputs {
    fn create(&self, _deck: DeckId, _kind: OutputKind) -> Box<dyn MediaTransport> {
        Box::new(SimTransport::new(self.clock.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn transport() -> (Arc<ManualClock>, SimTransport) {
        let clock = Arc::new(ManualClock::new());
        let mut t = SimTransport::new(clock.clone());
        t.set_source(Some(MediaSource {
            path: PathBuf::from("/clips/a.wav"),
            duration_ms: 4000,
        }));
        (clock, t)
    }

    #[test]
    fn test_position_follows_rate() {
        let (clock, mut t) = transport();
        t.play();
        clock.advance_ms(1000);
        assert_eq!(t.position_ms(), 1000);

        t.set_rate(1.5);
        clock.advance_ms(1000);
        assert_eq!(t.position_ms(), 2500);

        t.pause();
        clock.advance_ms(1000);
        assert_eq!(t.position_ms(), 2500);
    }

    #[test]
    fn test_end_of_media() {
        let (clock, mut t) = transport();
        t.seek(3500);
        t.play();
        clock.advance_ms(1000);
        assert_eq!(t.position_ms(), 4000);
        assert!(!t.is_playing());

        t.set_looping(true);
        t.seek(3500);
        clock.advance_ms(1000);
        assert_eq!(t.position_ms(), 500);
        assert!(t.is_playing());
    }

    #[test]
    fn test_no_source_never_plays() {
        let clock = Arc::new(ManualClock::new());
        let mut t = SimTransport::new(clock.clone());
        t.play();
        clock.advance_ms(100);
        assert!(!t.is_playing());
        assert_eq!(t.position_ms(), 0);
    }
}
