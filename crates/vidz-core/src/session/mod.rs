//! Persisted performance sessions
//!
//! A session captures everything a performer sets up by hand: bank
//! assignments, per-clip step patterns, loop windows, hot cues and loop
//! modes, the key and MIDI tables, and the master tempo. It is stored as
//! JSON. Integer-keyed maps (banks, steps, hot cue slots) are written with
//! string keys, as JSON requires, and converted back in [`schema`].
//!
//! Loading is forgiving: a malformed field or entry is logged and skipped,
//! and everything else still loads.

mod schema;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::clip::{LoopWindow, StepPattern};
use crate::control::{Action, MidiBinding};
use crate::types::{NUM_BANKS, NUM_DECKS};

/// Pad assignments of one bank, in deck order
pub type BankSlots = [Option<PathBuf>; NUM_DECKS];

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to read session: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-clip settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipSession {
    pub pattern: StepPattern,
    pub loop_window: LoopWindow,
    /// Slot (1..=8) -> position in ms
    pub hot_cues: BTreeMap<u8, u64>,
    /// `None` keeps the clip's default
    pub looping: Option<bool>,
}

impl ClipSession {
    fn is_empty(&self) -> bool {
        self.pattern.is_empty()
            && self.loop_window == LoopWindow::default()
            && self.hot_cues.is_empty()
            && self.looping.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub banks: [BankSlots; NUM_BANKS],
    pub clips: BTreeMap<PathBuf, ClipSession>,
    /// Key table in routing order
    pub keys: Vec<(Action, u32)>,
    /// MIDI table in routing order. `None` records an explicitly unbound action.
    pub midi: Vec<(Action, Option<MidiBinding>)>,
    pub master_bpm: Option<f64>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            banks: Default::default(),
            clips: BTreeMap::new(),
            keys: Vec::new(),
            midi: Vec::new(),
            master_bpm: None,
        }
    }
}

impl Session {
    /// Settings for a clip, created on first use
    pub fn clip_mut(&mut self, path: &Path) -> &mut ClipSession {
        self.clips.entry(path.to_path_buf()).or_default()
    }

    /// Drop clips that carry nothing but defaults
    pub fn prune(&mut self) {
        self.clips.retain(|_, c| !c.is_empty());
    }

    /// Read a session file
    ///
    /// Fails only when the file can't be read or isn't JSON at all. Bad
    /// fields inside a valid document are skipped.
    pub fn load(path: &Path) -> std::result::Result<Self, SessionError> {
        let contents = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&contents)?;
        let session = schema::from_value(&value);
        log::info!(
            "[SESSION] Loaded {:?}: {} clip(s), {} key and {} MIDI binding(s)",
            path,
            session.clips.len(),
            session.keys.len(),
            session.midi.len()
        );
        Ok(session)
    }

    /// Write the session, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create session directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&schema::to_value(self))
            .context("Failed to serialize session")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {:?}", path))?;
        log::info!("[SESSION] Saved {:?}", path);
        Ok(())
    }

    pub fn from_value(value: &serde_json::Value) -> Self {
        schema::from_value(value)
    }

    pub fn to_value(&self) -> serde_json::Value {
        schema::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeckId;

    fn sample() -> Session {
        let mut session = Session::default();
        session.banks[0][0] = Some(PathBuf::from("/clips/intro.mp4"));
        session.banks[2][3] = Some(PathBuf::from("/clips/drop.mov"));
        let clip = session.clip_mut(Path::new("/clips/intro.mp4"));
        clip.pattern = [(0, 0.0), (16, 0.5), (63, 1.0)].into_iter().collect();
        clip.loop_window = LoopWindow::new(8, 32);
        clip.hot_cues.insert(1, 1500);
        clip.hot_cues.insert(8, 90_000);
        clip.looping = Some(false);
        session.keys = vec![(Action::PlayPause, 0x20), (Action::Trigger(DeckId(0)), 0x41)];
        session.midi = vec![
            (Action::Fader(DeckId(1)), Some(MidiBinding::cc(7).on_channel(2))),
            (Action::TapTempo, None),
        ];
        session.master_bpm = Some(128.5);
        session
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sets").join("session.json");
        let session = sample();
        session.save(&path).unwrap();
        let loaded = Session::load(&path).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[test]
    fn test_load_garbage_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Session::load(&path), Err(SessionError::Json(_))));
    }

    #[test]
    fn test_prune_drops_default_clips() {
        let mut session = sample();
        session.clip_mut(Path::new("/clips/untouched.mp4"));
        session.prune();
        assert_eq!(session.clips.len(), 1);
    }
}
