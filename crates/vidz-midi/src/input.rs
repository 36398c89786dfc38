//! MIDI input handling
//!
//! Receives raw MIDI bytes in the midir callback, parses them into
//! [`MidiEvent`]s and forwards them through a flume channel. The callback
//! runs on the MIDI driver thread and never blocks: when the channel is full
//! the event is dropped.

use flume::{Receiver, Sender};
use midir::MidiInputConnection;
use vidz_core::control::{InputEvent, MidiEvent};

use crate::connection::{find_input_port, MidiConnectionError};

/// Events buffered between the driver thread and the consumer
const CHANNEL_CAPACITY: usize = 256;

/// Parse raw MIDI bytes
///
/// - Note Off: `0x8n nn vv` (n = channel, nn = note, vv = velocity)
/// - Note On: `0x9n nn vv`. Velocity 0 is a Note Off.
/// - Control Change: `0xBn cc vv`
///
/// Everything else (pitch bend, aftertouch, clock, sysex) is ignored.
pub fn parse(data: &[u8]) -> Option<MidiEvent> {
    let (&status, rest) = data.split_first()?;
    let [data1, data2, ..] = *rest else {
        return None;
    };
    let channel = status & 0x0F;

    match status & 0xF0 {
        0x80 => Some(MidiEvent::NoteOff {
            channel,
            note: data1,
            velocity: data2,
        }),
        0x90 if data2 == 0 => Some(MidiEvent::NoteOff {
            channel,
            note: data1,
            velocity: 0,
        }),
        0x90 => Some(MidiEvent::NoteOn {
            channel,
            note: data1,
            velocity: data2,
        }),
        0xB0 => Some(MidiEvent::ControlChange {
            channel,
            cc: data1,
            value: data2,
        }),
        _ => None,
    }
}

/// Live MIDI input
///
/// Keeps the midir connection open for as long as it lives; dropping it
/// closes the port.
pub struct MidiInput {
    _connection: MidiInputConnection<Sender<InputEvent>>,
    port_name: String,
    event_rx: Receiver<InputEvent>,
}

impl MidiInput {
    /// Connect to the first input port whose name contains `port_match`
    pub fn connect(port_match: &str) -> Result<Self, MidiConnectionError> {
        let (midi_in, port, port_name) = find_input_port(port_match)?;
        let (event_tx, event_rx) = flume::bounded(CHANNEL_CAPACITY);

        let connection = midi_in
            .connect(&port, "vidz-midi-input", Self::midi_callback, event_tx)
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;

        log::info!("MIDI: Listening on {}", port_name);

        Ok(Self {
            _connection: connection,
            port_name,
            event_rx,
        })
    }

    fn midi_callback(_timestamp: u64, data: &[u8], tx: &mut Sender<InputEvent>) {
        let Some(event) = parse(data) else {
            return;
        };
        if tx.try_send(InputEvent::Midi(event)).is_err() {
            log::warn!("MIDI: Event channel full, dropping {:?}", event);
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Receiver for parsed events
    pub fn events(&self) -> Receiver<InputEvent> {
        self.event_rx.clone()
    }
}
