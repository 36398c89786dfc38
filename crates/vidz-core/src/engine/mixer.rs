//! Mixer - Turns crossfader, channel faders and mutes into deck volumes
//!
//! Features:
//! - Crossfader with linear or constant-power law
//! - Per-channel fader, mute and crossfader assignment
//! - Dominant-side lookup for actions that target "the deck in front"

use std::f32::consts::FRAC_PI_2;

use crate::config::CrossfadeLaw;
use crate::types::{DeckId, NUM_DECKS};

/// Which side of the crossfader a channel sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossfadeSide {
    A,
    B,
    /// Unaffected by the crossfader
    #[default]
    Thru,
}

/// Channel strip state for a single deck
#[derive(Debug, Clone)]
pub struct ChannelStrip {
    /// Channel fader (0.0 to 1.0)
    pub fader: f32,
    pub muted: bool,
    pub side: CrossfadeSide,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self {
            fader: 1.0,
            muted: false,
            side: CrossfadeSide::Thru,
        }
    }
}

/// Deck volume calculator
#[derive(Debug, Clone)]
pub struct Mixer {
    channels: [ChannelStrip; NUM_DECKS],
    /// Crossfader position (0.0 = full A, 1.0 = full B)
    crossfader: f32,
    law: CrossfadeLaw,
}

impl Mixer {
    pub fn new(law: CrossfadeLaw) -> Self {
        let mut channels: [ChannelStrip; NUM_DECKS] = Default::default();
        channels[0].side = CrossfadeSide::A;
        channels[1].side = CrossfadeSide::B;
        Self {
            channels,
            crossfader: 0.0,
            law,
        }
    }

    pub fn channel(&self, deck: DeckId) -> Option<&ChannelStrip> {
        self.channels.get(deck.0)
    }

    pub fn channel_mut(&mut self, deck: DeckId) -> Option<&mut ChannelStrip> {
        self.channels.get_mut(deck.0)
    }

    pub fn law(&self) -> CrossfadeLaw {
        self.law
    }

    pub fn set_law(&mut self, law: CrossfadeLaw) {
        self.law = law;
    }

    /// Set crossfader position, clamped to 0.0-1.0
    pub fn set_crossfade(&mut self, x: f32) {
        self.crossfader = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
    }

    pub fn crossfade(&self) -> f32 {
        self.crossfader
    }

    /// (A gain, B gain) at the current crossfader position
    pub fn crossfade_gains(&self) -> (f32, f32) {
        let x = self.crossfader;
        match self.law {
            CrossfadeLaw::Linear => (1.0 - x, x),
            CrossfadeLaw::ConstantPower => ((x * FRAC_PI_2).cos(), (x * FRAC_PI_2).sin()),
        }
    }

    pub fn set_fader(&mut self, deck: DeckId, value: f32) {
        if let Some(ch) = self.channel_mut(deck) {
            ch.fader = value.clamp(0.0, 1.0);
        }
    }

    pub fn set_muted(&mut self, deck: DeckId, muted: bool) {
        if let Some(ch) = self.channel_mut(deck) {
            ch.muted = muted;
        }
    }

    /// Flip a channel's mute. Returns the new state.
    pub fn toggle_mute(&mut self, deck: DeckId) -> bool {
        match self.channel_mut(deck) {
            Some(ch) => {
                ch.muted = !ch.muted;
                ch.muted
            }
            None => false,
        }
    }

    pub fn set_side(&mut self, deck: DeckId, side: CrossfadeSide) {
        if let Some(ch) = self.channel_mut(deck) {
            ch.side = side;
        }
    }

    /// Final volume for a deck: `fader * crossfade gain * !muted`
    pub fn deck_volume(&self, deck: DeckId) -> f32 {
        let Some(ch) = self.channel(deck) else {
            return 0.0;
        };
        if ch.muted {
            return 0.0;
        }
        let (a, b) = self.crossfade_gains();
        let gain = match ch.side {
            CrossfadeSide::A => a,
            CrossfadeSide::B => b,
            CrossfadeSide::Thru => 1.0,
        };
        ch.fader * gain
    }

    /// Volumes of every deck in index order
    pub fn volumes(&self) -> [f32; NUM_DECKS] {
        std::array::from_fn(|i| self.deck_volume(DeckId(i)))
    }

    /// The crossfader side currently in front
    pub fn dominant_side(&self) -> CrossfadeSide {
        if self.crossfader > 0.5 {
            CrossfadeSide::B
        } else {
            CrossfadeSide::A
        }
    }

    /// First deck assigned to the dominant side
    pub fn dominant_deck(&self) -> DeckId {
        let side = self.dominant_side();
        self.channels
            .iter()
            .position(|ch| ch.side == side)
            .map(DeckId)
            .unwrap_or(DeckId(0))
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(CrossfadeLaw::default())
    }
}
