//! Input events and the bindings that match them

use serde::{Deserialize, Serialize};

/// Key codes in the Qt key code space, which saved sessions use
pub mod key {
    pub const SPACE: u32 = 0x20;
    pub const RETURN: u32 = 0x0100_0004;
    pub const ENTER: u32 = 0x0100_0005;
    pub const ESCAPE: u32 = 0x0100_0000;
    pub const TAB: u32 = 0x0100_0001;
    pub const LEFT: u32 = 0x0100_0012;
    pub const UP: u32 = 0x0100_0013;
    pub const RIGHT: u32 = 0x0100_0014;
    pub const DOWN: u32 = 0x0100_0015;

    /// Code of an ASCII letter or digit (letters map to their upper case)
    pub const fn ascii(c: char) -> u32 {
        (c as u32 as u8).to_ascii_uppercase() as u32
    }

    /// Look up a key by name: `space`, `return`, `left`, or a single letter/digit
    pub fn from_name(name: &str) -> Option<u32> {
        let name = name.trim().to_ascii_lowercase();
        let code = match name.as_str() {
            "space" => SPACE,
            "return" => RETURN,
            "enter" => ENTER,
            "escape" | "esc" => ESCAPE,
            "tab" => TAB,
            "left" => LEFT,
            "up" => UP,
            "right" => RIGHT,
            "down" => DOWN,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => ascii(c),
                    _ => return None,
                }
            }
        };
        Some(code)
    }
}

/// MIDI message kinds a binding can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiMessageType {
    NoteOn,
    NoteOff,
    ControlChange,
}

/// A MIDI control address, stored as `{"type": ..., "val": ..., "channel": ...}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MidiBinding {
    #[serde(rename = "type")]
    pub message_type: MidiMessageType,
    /// Note or controller number
    #[serde(rename = "val")]
    pub number: u8,
    /// `None` matches every channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

impl MidiBinding {
    pub fn note(number: u8) -> Self {
        Self {
            message_type: MidiMessageType::NoteOn,
            number,
            channel: None,
        }
    }

    pub fn cc(number: u8) -> Self {
        Self {
            message_type: MidiMessageType::ControlChange,
            number,
            channel: None,
        }
    }

    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    fn is_note(&self) -> bool {
        matches!(
            self.message_type,
            MidiMessageType::NoteOn | MidiMessageType::NoteOff
        )
    }
}

/// Anything an action can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Key(u32),
    Midi(MidiBinding),
}

/// Parsed MIDI channel message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match self {
            Self::NoteOn { channel, .. } => *channel,
            Self::NoteOff { channel, .. } => *channel,
            Self::ControlChange { channel, .. } => *channel,
        }
    }
}

/// Raw input delivered to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyPress(u32),
    KeyRelease(u32),
    Midi(MidiEvent),
}

/// Value carried by a routed event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlValue {
    /// Button pressed (true) or released (false)
    Button(bool),
    /// Absolute control position, 0.0-1.0
    Absolute(f64),
}

impl ControlValue {
    pub fn is_press(&self) -> bool {
        match self {
            ControlValue::Button(pressed) => *pressed,
            ControlValue::Absolute(v) => *v > 0.5,
        }
    }

    /// Position in 0.0-1.0. Buttons read as 1.0 pressed, 0.0 released.
    pub fn as_unit(&self) -> f64 {
        match self {
            ControlValue::Button(true) => 1.0,
            ControlValue::Button(false) => 0.0,
            ControlValue::Absolute(v) => v.clamp(0.0, 1.0),
        }
    }
}

impl Binding {
    /// The value this binding reads from `event`, if it matches
    ///
    /// Note bindings match note on and note off for the same note, so a pad
    /// produces both press and release. Channel `None` matches any channel.
    pub fn matches(&self, event: &InputEvent) -> Option<ControlValue> {
        match (self, event) {
            (Binding::Key(code), InputEvent::KeyPress(k)) if code == k => {
                Some(ControlValue::Button(true))
            }
            (Binding::Key(code), InputEvent::KeyRelease(k)) if code == k => {
                Some(ControlValue::Button(false))
            }
            (Binding::Midi(b), InputEvent::Midi(ev)) => {
                if b.channel.is_some_and(|ch| ch != ev.channel()) {
                    return None;
                }
                match *ev {
                    MidiEvent::NoteOn { note, .. } if b.is_note() && note == b.number => {
                        Some(ControlValue::Button(true))
                    }
                    MidiEvent::NoteOff { note, .. } if b.is_note() && note == b.number => {
                        Some(ControlValue::Button(false))
                    }
                    MidiEvent::ControlChange { cc, value, .. }
                        if b.message_type == MidiMessageType::ControlChange && cc == b.number =>
                    {
                        Some(ControlValue::Absolute(value as f64 / 127.0))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self, Binding::Key(_))
    }
}
