//! Common types for vidz
//!
//! Identifiers and fixed dimensions shared by the engine, the control router
//! and the session format.

use std::fmt;

/// Number of decks (one per pad key)
pub const NUM_DECKS: usize = 4;

/// Number of clip banks
pub const NUM_BANKS: usize = 3;

/// Pad keys in deck order. Bank assignments and per-deck action names use these.
pub const PAD_KEYS: [char; NUM_DECKS] = ['a', 's', 'd', 'f'];

/// Number of hot cue slots per clip (numbered 1..=HOT_CUE_SLOTS)
pub const HOT_CUE_SLOTS: u8 = 8;

/// Length of the step sequencer grid (16th notes)
pub const SEQ_STEPS: u32 = 64;

/// Stutter loop lengths selectable by action
pub const STUTTER_SIZES_MS: [u64; 4] = [1000, 500, 250, 100];

/// Tempo assumed for clips whose analysis failed
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Master tempo bounds
pub const MIN_BPM: f64 = 10.0;
pub const MAX_BPM: f64 = 300.0;

/// Deck identifier (0-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeckId(pub usize);

impl DeckId {
    /// Create a new deck ID (panics if >= NUM_DECKS)
    pub fn new(id: usize) -> Self {
        assert!(id < NUM_DECKS, "Deck ID must be less than {}", NUM_DECKS);
        Self(id)
    }

    /// All decks in evaluation order
    pub fn all() -> impl Iterator<Item = DeckId> {
        (0..NUM_DECKS).map(DeckId)
    }

    /// Look up the deck driven by a pad key (case-insensitive)
    pub fn from_pad_key(key: char) -> Option<Self> {
        let key = key.to_ascii_lowercase();
        PAD_KEYS.iter().position(|&k| k == key).map(DeckId)
    }

    /// Pad key for this deck
    pub fn pad_key(&self) -> char {
        PAD_KEYS[self.0]
    }

    /// Upper-case letter used in action names (`MUTE_A`, `TRIGGER_S`, ...)
    pub fn letter(&self) -> char {
        self.pad_key().to_ascii_uppercase()
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deck {}", self.letter())
    }
}

/// Stable clip identifier handed out by the clip registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u32);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

/// Sequencer rate multiplier applied on top of the master tempo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeqRate {
    Half,
    #[default]
    Normal,
    Double,
}

impl SeqRate {
    pub fn multiplier(&self) -> f64 {
        match self {
            SeqRate::Half => 0.5,
            SeqRate::Normal => 1.0,
            SeqRate::Double => 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_pad_keys() {
        assert_eq!(DeckId::from_pad_key('a'), Some(DeckId(0)));
        assert_eq!(DeckId::from_pad_key('F'), Some(DeckId(3)));
        assert_eq!(DeckId::from_pad_key('x'), None);
        assert_eq!(DeckId(1).letter(), 'S');
    }

    #[test]
    fn test_seq_rate_multiplier() {
        assert_eq!(SeqRate::default().multiplier(), 1.0);
        assert_eq!(SeqRate::Half.multiplier(), 0.5);
        assert_eq!(SeqRate::Double.multiplier(), 2.0);
    }
}
