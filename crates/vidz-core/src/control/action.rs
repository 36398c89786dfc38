//! Performance actions that keys and MIDI controls can be bound to
//!
//! Actions are persisted by name (`PLAY_PAUSE`, `TRIGGER_A`, `HOTCUE_3`...),
//! so the names are part of the session format.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{DeckId, SeqRate, HOT_CUE_SLOTS, NUM_BANKS, STUTTER_SIZES_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    /// Resume all decks, or fade out the playing ones
    PlayPause,
    /// Start/stop the step sequencer
    ToggleSequencer,
    TapTempo,
    NudgeUp,
    NudgeDown,
    ToggleSync,
    AlignPhase,
    SeqRate(SeqRate),

    // ─────────────────────────────────────────────────────────────
    // Clips
    // ─────────────────────────────────────────────────────────────
    /// Switch to bank 0..NUM_BANKS
    Bank(usize),
    Quantize,
    HotCue(u8),
    HotCueClear(u8),
    /// Loop length of held stutters, one of `STUTTER_SIZES_MS`
    StutterSize(u64),

    // ─────────────────────────────────────────────────────────────
    // Per deck
    // ─────────────────────────────────────────────────────────────
    Trigger(DeckId),
    /// Momentary: loop back to the press position until let go, then fade out
    Stutter(DeckId),
    /// Momentary: like `Stutter`, but let-go resumes where the clip would be
    Slip(DeckId),
    Mute(DeckId),
    /// Channel fader (continuous)
    Fader(DeckId),
    /// Monitor routing toggle
    Cue(DeckId),

    // ─────────────────────────────────────────────────────────────
    // Mixer
    // ─────────────────────────────────────────────────────────────
    /// Crossfader (continuous)
    Crossfader,
}

impl Action {
    /// Every bindable action, in a stable order
    pub fn all() -> Vec<Action> {
        let mut actions = vec![
            Action::PlayPause,
            Action::ToggleSequencer,
            Action::TapTempo,
            Action::NudgeUp,
            Action::NudgeDown,
            Action::ToggleSync,
            Action::AlignPhase,
            Action::SeqRate(SeqRate::Half),
            Action::SeqRate(SeqRate::Normal),
            Action::SeqRate(SeqRate::Double),
            Action::Quantize,
            Action::Crossfader,
        ];
        actions.extend((0..NUM_BANKS).map(Action::Bank));
        actions.extend((1..=HOT_CUE_SLOTS).map(Action::HotCue));
        actions.extend((1..=HOT_CUE_SLOTS).map(Action::HotCueClear));
        actions.extend(STUTTER_SIZES_MS.into_iter().map(Action::StutterSize));
        for deck in DeckId::all() {
            actions.extend([
                Action::Trigger(deck),
                Action::Stutter(deck),
                Action::Slip(deck),
                Action::Mute(deck),
                Action::Fader(deck),
                Action::Cue(deck),
            ]);
        }
        actions
    }

    /// Whether the action follows a control's position rather than presses
    pub fn is_continuous(&self) -> bool {
        matches!(self, Action::Fader(_) | Action::Crossfader)
    }

    /// Whether the action needs release events too
    pub fn is_momentary(&self) -> bool {
        matches!(self, Action::Stutter(_) | Action::Slip(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::PlayPause => write!(f, "PLAY_PAUSE"),
            Action::ToggleSequencer => write!(f, "TOGGLE_SEQUENCER"),
            Action::TapTempo => write!(f, "TAP_TEMPO"),
            Action::NudgeUp => write!(f, "NUDGE_UP"),
            Action::NudgeDown => write!(f, "NUDGE_DOWN"),
            Action::ToggleSync => write!(f, "TOGGLE_SYNC"),
            Action::AlignPhase => write!(f, "ALIGN_PHASE"),
            Action::SeqRate(SeqRate::Half) => write!(f, "SEQ_RATE_HALF"),
            Action::SeqRate(SeqRate::Normal) => write!(f, "SEQ_RATE_NORMAL"),
            Action::SeqRate(SeqRate::Double) => write!(f, "SEQ_RATE_DOUBLE"),
            Action::Bank(i) => write!(f, "BANK_{}", i + 1),
            Action::Quantize => write!(f, "QUANTIZE"),
            Action::HotCue(n) => write!(f, "HOTCUE_{}", n),
            Action::HotCueClear(n) => write!(f, "HOTCUE_CLEAR_{}", n),
            Action::StutterSize(ms) => write!(f, "STUTTER_SIZE_{}", ms),
            Action::Trigger(d) => write!(f, "TRIGGER_{}", d.letter()),
            Action::Stutter(d) => write!(f, "STUTTER_{}", d.letter()),
            Action::Slip(d) => write!(f, "SLIP_{}", d.letter()),
            Action::Mute(d) => write!(f, "MUTE_{}", d.letter()),
            Action::Fader(d) => write!(f, "FADER_{}", d.letter()),
            Action::Cue(d) => write!(f, "CUE_{}", d.letter()),
            Action::Crossfader => write!(f, "CROSSFADER"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownAction(s.to_string());
        let action = match s {
            "PLAY_PAUSE" => Action::PlayPause,
            "TOGGLE_SEQUENCER" => Action::ToggleSequencer,
            "TAP_TEMPO" => Action::TapTempo,
            "NUDGE_UP" => Action::NudgeUp,
            "NUDGE_DOWN" => Action::NudgeDown,
            "TOGGLE_SYNC" => Action::ToggleSync,
            "ALIGN_PHASE" => Action::AlignPhase,
            "SEQ_RATE_HALF" => Action::SeqRate(SeqRate::Half),
            "SEQ_RATE_NORMAL" => Action::SeqRate(SeqRate::Normal),
            "SEQ_RATE_DOUBLE" => Action::SeqRate(SeqRate::Double),
            "QUANTIZE" => Action::Quantize,
            "CROSSFADER" => Action::Crossfader,
            _ => {
                if let Some(n) = s.strip_prefix("BANK_") {
                    let n: usize = n.parse().map_err(|_| unknown())?;
                    if !(1..=NUM_BANKS).contains(&n) {
                        return Err(unknown());
                    }
                    Action::Bank(n - 1)
                } else if let Some(ms) = s.strip_prefix("STUTTER_SIZE_") {
                    let ms: u64 = ms.parse().map_err(|_| unknown())?;
                    if !STUTTER_SIZES_MS.contains(&ms) {
                        return Err(unknown());
                    }
                    Action::StutterSize(ms)
                } else if let Some(n) = s.strip_prefix("HOTCUE_CLEAR_") {
                    Action::HotCueClear(parse_slot(n).ok_or_else(unknown)?)
                } else if let Some(n) = s.strip_prefix("HOTCUE_") {
                    Action::HotCue(parse_slot(n).ok_or_else(unknown)?)
                } else {
                    let (name, letter) = s.rsplit_once('_').ok_or_else(unknown)?;
                    let deck = parse_deck(letter).ok_or_else(unknown)?;
                    match name {
                        "TRIGGER" => Action::Trigger(deck),
                        "STUTTER" => Action::Stutter(deck),
                        "SLIP" => Action::Slip(deck),
                        "MUTE" => Action::Mute(deck),
                        "FADER" => Action::Fader(deck),
                        "CUE" => Action::Cue(deck),
                        _ => return Err(unknown()),
                    }
                }
            }
        };
        Ok(action)
    }
}

fn parse_slot(s: &str) -> Option<u8> {
    s.parse::<u8>()
        .ok()
        .filter(|n| (1..=HOT_CUE_SLOTS).contains(n))
}

fn parse_deck(letter: &str) -> Option<DeckId> {
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => DeckId::from_pad_key(c),
        _ => None,
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for action in Action::all() {
            let name = action.to_string();
            assert_eq!(name.parse::<Action>(), Ok(action), "{}", name);
        }
    }

    #[test]
    fn test_known_names() {
        assert_eq!("MUTE_A".parse(), Ok(Action::Mute(DeckId(0))));
        assert_eq!("TRIGGER_F".parse(), Ok(Action::Trigger(DeckId(3))));
        assert_eq!("BANK_3".parse(), Ok(Action::Bank(2)));
        assert_eq!("HOTCUE_CLEAR_8".parse(), Ok(Action::HotCueClear(8)));
        assert_eq!(Action::Fader(DeckId(1)).to_string(), "FADER_S");
        assert_eq!("SLIP_A".parse(), Ok(Action::Slip(DeckId(0))));
        assert_eq!("STUTTER_SIZE_250".parse(), Ok(Action::StutterSize(250)));
        assert!(Action::Slip(DeckId(3)).is_momentary());
    }

    #[test]
    fn test_rejects_unknown() {
        for name in ["", "BANK_0", "BANK_4", "HOTCUE_9", "HOTCUE_0", "MUTE_Z", "MUTE_a", "FOO_A", "PLAY", "STUTTER_SIZE_300", "STUTTER_SIZE_"] {
            assert!(name.parse::<Action>().is_err(), "{}", name);
        }
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&Action::HotCue(3)).unwrap();
        assert_eq!(json, "\"HOTCUE_3\"");
        let back: Action = serde_json::from_str("\"STUTTER_D\"").unwrap();
        assert_eq!(back, Action::Stutter(DeckId(2)));
        assert!(serde_json::from_str::<Action>("\"NOPE\"").is_err());
    }
}
