//! Commands sent to the control thread
//!
//! Hosts (the player binary, MIDI input, a future UI) never touch engine
//! state directly. They send [`EngineCommand`]s over a crossbeam channel and
//! the control thread applies them in order between timer ticks.
//!
//! ```ignore
//! let control = ControlThread::spawn(engine)?;
//! control.send(EngineCommand::SwitchBank { bank: 1 })?;
//! control.send(EngineCommand::Input(InputEvent::KeyPress(key::SPACE)))?;
//! ```

use std::path::PathBuf;

use crate::control::{Action, InputEvent, MidiBinding};
use crate::engine::mixer::CrossfadeSide;
use crate::types::{DeckId, SeqRate};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    // ─────────────────────────────────────────────────────────────
    // Input
    // ─────────────────────────────────────────────────────────────
    /// Raw key or MIDI event, resolved through the control router
    Input(InputEvent),
    /// Bind an action to a key code, replacing its previous key
    BindKey { action: Action, code: u32 },
    /// Bind or unbind an action's MIDI control
    BindMidi {
        action: Action,
        binding: Option<MidiBinding>,
    },

    // ─────────────────────────────────────────────────────────────
    // Clips and banks
    // ─────────────────────────────────────────────────────────────
    LoadClip { deck: DeckId, path: PathBuf },
    UnloadClip { deck: DeckId },
    /// Set a pad in a bank. Loads immediately if the bank is active.
    AssignPad {
        bank: usize,
        deck: DeckId,
        path: Option<PathBuf>,
    },
    SwitchBank { bank: usize },

    // ─────────────────────────────────────────────────────────────
    // Playback
    // ─────────────────────────────────────────────────────────────
    /// Resume all decks, or fade out the playing ones
    TogglePlay,
    /// Restart a deck at a clip position (click-free)
    Trigger { deck: DeckId, position_ms: u64 },
    /// Release a held trigger
    Release { deck: DeckId },
    /// Loop back to the current position every stutter interval
    StutterPress { deck: DeckId },
    /// Same loop, but release resumes where the clip would have been
    SlipPress { deck: DeckId },
    /// End either kind of stutter
    StutterRelease { deck: DeckId },
    SetStutterSize { ms: u64 },
    Seek { deck: DeckId, position_ms: u64 },
    SetLooping { deck: DeckId, looping: bool },

    // ─────────────────────────────────────────────────────────────
    // Tempo
    // ─────────────────────────────────────────────────────────────
    SetMasterBpm { bpm: f64 },
    NudgeBpm { delta: f64 },
    TapTempo,
    SetSyncEnabled { enabled: bool },
    /// Line every playing deck up with the transport's beat phase
    AlignPhase,

    // ─────────────────────────────────────────────────────────────
    // Sequencer
    // ─────────────────────────────────────────────────────────────
    ToggleSequencer,
    SetSeqRate { rate: SeqRate },
    /// Edit the pattern of the clip on `deck`. `None` clears the step.
    SetStep {
        deck: DeckId,
        step: u32,
        position: Option<f64>,
    },
    SetLoopWindow { deck: DeckId, start: u32, length: u32 },
    /// Snap the patterns of the active bank's clips to the quantize grid
    Quantize,

    // ─────────────────────────────────────────────────────────────
    // Hot cues (dominant deck)
    // ─────────────────────────────────────────────────────────────
    HotCue { slot: u8 },
    ClearHotCue { slot: u8 },

    // ─────────────────────────────────────────────────────────────
    // Mixer
    // ─────────────────────────────────────────────────────────────
    SetCrossfade { value: f32 },
    SetFader { deck: DeckId, value: f32 },
    ToggleMute { deck: DeckId },
    SetCrossfadeSide { deck: DeckId, side: CrossfadeSide },
    SetCue { deck: DeckId, enabled: bool },

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────
    /// Stop the control thread. Handled by the loop, not the engine.
    Shutdown,
}
