//! Clips - registry, analysis results and per-clip sequencer data

mod pattern;
mod registry;

pub use pattern::{LoopWindow, StepPattern};
pub use registry::{ClipAudio, ClipEntry, ClipMetadata, ClipRegistry};
