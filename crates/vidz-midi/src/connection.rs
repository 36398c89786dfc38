//! MIDI port discovery
//!
//! Uses midir for cross-platform MIDI input (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).

use midir::{MidiInput, MidiInputPort};

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("No MIDI input ports available")]
    NoInputPorts,

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),

    #[error("Failed to get port info: {0}")]
    PortInfoError(String),
}

/// Find the first input port whose name contains `port_match` (case-insensitive)
///
/// Returns the midir client along with the port so the caller can connect
/// its own callback.
pub fn find_input_port(port_match: &str) -> Result<(MidiInput, MidiInputPort, String), MidiConnectionError> {
    let midi_in = MidiInput::new("vidz-midi-in")
        .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

    let mut ports = midi_in.ports();
    if ports.is_empty() {
        return Err(MidiConnectionError::NoInputPorts);
    }

    let names: Vec<String> = ports
        .iter()
        .map(|port| midi_in.port_name(port).unwrap_or_default())
        .collect();
    let index = matching_port(&names, port_match)
        .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;

    let port = ports.swap_remove(index);
    let name = midi_in
        .port_name(&port)
        .map_err(|e| MidiConnectionError::PortInfoError(e.to_string()))?;
    log::info!("MIDI: Found input port: {}", name);

    Ok((midi_in, port, name))
}

/// List all available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>, MidiConnectionError> {
    let midi_in = MidiInput::new("vidz-midi-list")
        .map_err(|e| MidiConnectionError::InputInitError(e.to_string()))?;

    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

fn matching_port(names: &[String], port_match: &str) -> Option<usize> {
    let pattern = port_match.to_lowercase();
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_port_is_case_insensitive_substring() {
        let names = vec![
            "Midi Through Port-0".to_string(),
            "Launchpad Mini MK3 MIDI 1".to_string(),
            "nanoKONTROL2 SLIDER/KNOB".to_string(),
        ];
        assert_eq!(matching_port(&names, "launchpad"), Some(1));
        assert_eq!(matching_port(&names, "KONTROL"), Some(2));
        assert_eq!(matching_port(&names, "mpk"), None);
    }

    #[test]
    fn test_list_ports() {
        // Port availability depends on the system; enumeration must not panic
        let _ = list_input_ports();
    }
}
