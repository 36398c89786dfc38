//! Action table and event routing

use super::action::Action;
use super::binding::{key, Binding, ControlValue, InputEvent, MidiBinding};
use crate::types::{DeckId, NUM_BANKS};

/// An event resolved to an action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutedAction {
    pub action: Action,
    pub value: ControlValue,
}

/// Flat table of `(action, binding)` pairs
///
/// An action holds at most one key binding and one MIDI binding. Events are
/// checked against the table in insertion order and the first match wins.
/// Binding an action again replaces its previous binding of the same kind in
/// place; nothing checks whether two actions share a control.
#[derive(Debug, Clone, Default)]
pub struct ControlRouter {
    table: Vec<(Action, Binding)>,
}

impl ControlRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the default keyboard layout
    pub fn with_defaults() -> Self {
        let mut router = Self::new();
        for (action, code) in default_keys() {
            router.bind(action, Binding::Key(code));
        }
        router
    }

    pub fn bind(&mut self, action: Action, binding: Binding) {
        let slot = self
            .table
            .iter_mut()
            .find(|(a, b)| *a == action && b.is_key() == binding.is_key());
        match slot {
            Some(entry) => entry.1 = binding,
            None => self.table.push((action, binding)),
        }
    }

    pub fn bind_key(&mut self, action: Action, code: u32) {
        self.bind(action, Binding::Key(code));
    }

    pub fn bind_midi(&mut self, action: Action, midi: MidiBinding) {
        self.bind(action, Binding::Midi(midi));
    }

    /// Drop an action's key binding
    pub fn unbind_key(&mut self, action: Action) {
        self.table.retain(|(a, b)| !(*a == action && b.is_key()));
    }

    /// Drop an action's MIDI binding
    pub fn unbind_midi(&mut self, action: Action) {
        self.table.retain(|(a, b)| !(*a == action && !b.is_key()));
    }

    pub fn key_for(&self, action: Action) -> Option<u32> {
        self.table.iter().find_map(|(a, b)| match b {
            Binding::Key(code) if *a == action => Some(*code),
            _ => None,
        })
    }

    pub fn midi_for(&self, action: Action) -> Option<MidiBinding> {
        self.table.iter().find_map(|(a, b)| match b {
            Binding::Midi(m) if *a == action => Some(*m),
            _ => None,
        })
    }

    /// All bindings in table order
    pub fn bindings(&self) -> impl Iterator<Item = (Action, &Binding)> {
        self.table.iter().map(|(a, b)| (*a, b))
    }

    /// Resolve an event to the first matching action
    pub fn route(&self, event: &InputEvent) -> Option<RoutedAction> {
        self.table.iter().find_map(|(action, binding)| {
            binding.matches(event).map(|value| RoutedAction {
                action: *action,
                value,
            })
        })
    }
}

fn default_keys() -> Vec<(Action, u32)> {
    let mut keys = vec![
        (Action::PlayPause, key::SPACE),
        (Action::ToggleSequencer, key::ascii('p')),
        (Action::TapTempo, key::RETURN),
        (Action::Quantize, key::ascii('q')),
    ];
    keys.extend((0..NUM_BANKS).map(|i| (Action::Bank(i), key::ascii('5') + i as u32)));
    for deck in DeckId::all() {
        keys.push((Action::Mute(deck), key::ascii('1') + deck.0 as u32));
    }
    for deck in DeckId::all() {
        keys.push((Action::Trigger(deck), key::ascii(deck.pad_key())));
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::binding::MidiEvent;

    #[test]
    fn test_default_layout() {
        let router = ControlRouter::with_defaults();
        assert_eq!(router.key_for(Action::PlayPause), Some(0x20));
        assert_eq!(router.key_for(Action::ToggleSequencer), Some(0x50));
        assert_eq!(router.key_for(Action::TapTempo), Some(0x0100_0004));
        assert_eq!(router.key_for(Action::Bank(0)), Some(0x35));
        assert_eq!(router.key_for(Action::Bank(2)), Some(0x37));
        assert_eq!(router.key_for(Action::Mute(DeckId(3))), Some(0x34));
        assert_eq!(router.key_for(Action::Trigger(DeckId(1))), Some(0x53));
        assert_eq!(router.midi_for(Action::PlayPause), None);
    }

    #[test]
    fn test_route_key_press_and_release() {
        let router = ControlRouter::with_defaults();
        let routed = router.route(&InputEvent::KeyPress(key::SPACE)).unwrap();
        assert_eq!(routed.action, Action::PlayPause);
        assert!(routed.value.is_press());

        let routed = router.route(&InputEvent::KeyRelease(key::ascii('a'))).unwrap();
        assert_eq!(routed.action, Action::Trigger(DeckId(0)));
        assert!(!routed.value.is_press());

        assert!(router.route(&InputEvent::KeyPress(key::ascii('z'))).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = ControlRouter::new();
        router.bind_key(Action::TapTempo, key::SPACE);
        router.bind_key(Action::PlayPause, key::SPACE);
        let routed = router.route(&InputEvent::KeyPress(key::SPACE)).unwrap();
        assert_eq!(routed.action, Action::TapTempo);
    }

    #[test]
    fn test_rebind_replaces_in_place() {
        let mut router = ControlRouter::new();
        router.bind_key(Action::TapTempo, key::SPACE);
        router.bind_key(Action::PlayPause, key::SPACE);
        router.bind_key(Action::TapTempo, key::RETURN);

        assert_eq!(router.key_for(Action::TapTempo), Some(key::RETURN));
        assert_eq!(router.bindings().count(), 2);
        // TapTempo moved off Space, so Space now reaches PlayPause
        let routed = router.route(&InputEvent::KeyPress(key::SPACE)).unwrap();
        assert_eq!(routed.action, Action::PlayPause);
        // Position in the table is kept
        assert_eq!(router.bindings().next().unwrap().0, Action::TapTempo);
    }

    #[test]
    fn test_key_and_midi_coexist() {
        let mut router = ControlRouter::with_defaults();
        router.bind_midi(Action::Fader(DeckId(0)), MidiBinding::cc(7));
        router.bind_midi(Action::PlayPause, MidiBinding::note(60));
        assert_eq!(router.key_for(Action::PlayPause), Some(key::SPACE));
        assert_eq!(router.midi_for(Action::PlayPause), Some(MidiBinding::note(60)));

        let event = InputEvent::Midi(MidiEvent::ControlChange { channel: 0, cc: 7, value: 127 });
        let routed = router.route(&event).unwrap();
        assert_eq!(routed.action, Action::Fader(DeckId(0)));
        assert_eq!(routed.value, ControlValue::Absolute(1.0));

        router.unbind_midi(Action::PlayPause);
        assert_eq!(router.midi_for(Action::PlayPause), None);
        assert_eq!(router.key_for(Action::PlayPause), Some(key::SPACE));
    }
}
