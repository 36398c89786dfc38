//! Performance engine - decks, tempo sync, triggers, step sequencer, mixer
//!
//! Everything in here runs on the control thread. Long work (analysis,
//! stretch renders) lives in [`crate::services`].

mod command;
mod control;
mod deck;
mod engine;
mod envelope;
mod mixer;
mod renditions;
mod step_clock;
mod stutter;
mod tempo_sync;
mod transport;
mod trigger;

pub use command::EngineCommand;
pub use control::{ControlHandle, ControlThread};
pub use deck::{Deck, DeckOutputs};
pub use engine::PerformanceEngine;
pub use envelope::{Envelope, EnvelopeEvent, EnvelopeState};
pub use mixer::{ChannelStrip, CrossfadeSide, Mixer};
pub use renditions::{sweep_rendition_dir, AudioRendition, RenditionCache};
pub use step_clock::StepClock;
pub use stutter::{Stutter, StutterMode};
pub use tempo_sync::{SyncState, SyncTarget, TempoSync};
pub use transport::{MediaSource, MediaTransport, OutputFactory, OutputKind, SimOutputs, SimTransport};
pub use trigger::TriggerEngine;
