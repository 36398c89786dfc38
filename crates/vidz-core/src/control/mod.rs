//! Control routing
//!
//! Keyboard and MIDI input arrive as [`InputEvent`]s. The [`ControlRouter`]
//! resolves them against its action table into [`RoutedAction`]s, which the
//! engine turns into commands.

mod action;
mod binding;
mod router;

pub use action::{Action, UnknownAction};
pub use binding::{key, Binding, ControlValue, InputEvent, MidiBinding, MidiEvent, MidiMessageType};
pub use router::{ControlRouter, RoutedAction};
