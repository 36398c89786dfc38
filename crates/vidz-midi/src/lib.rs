//! MIDI controller input for vidz
//!
//! This crate provides:
//! - MIDI port discovery via midir
//! - Raw byte parsing into [`vidz_core::control::MidiEvent`]
//! - A flume bridge from the midir callback to the host
//!
//! # Architecture
//!
//! ```text
//! MIDI Device → midir callback → flume channel → host → EngineCommand::Input
//! ```
//!
//! Mapping events to actions is not done here; the engine's control router
//! owns the binding table.

mod connection;
mod input;

pub use connection::{find_input_port, list_input_ports, MidiConnectionError};
pub use input::{parse, MidiInput};
