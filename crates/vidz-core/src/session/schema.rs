//! JSON <-> [`Session`] conversion
//!
//! ```text
//! {
//!   "banks":     { "0": { "a": "/clips/intro.mp4" } },
//!   "sequencer": { "/clips/intro.mp4": { "points": { "16": 0.5 }, "loop_start": 0, "loop_length": 32 } },
//!   "hot_cues":  { "/clips/intro.mp4": { "1": 1500 } },
//!   "loops":     { "/clips/intro.mp4": true },
//!   "keys":      { "PLAY_PAUSE": 32 },
//!   "midi":      { "FADER_A": { "type": "control_change", "val": 7 }, "TAP_TEMPO": null },
//!   "master_bpm": 128.0
//! }
//! ```
//!
//! Older files carry `curves` (`path -> step -> position`) instead of
//! `sequencer`; those become patterns with the default loop window.

use std::path::PathBuf;
use std::str::FromStr;

use serde_json::{json, Map, Value};

use super::Session;
use crate::clip::{LoopWindow, StepPattern};
use crate::control::{Action, MidiBinding};
use crate::types::{DeckId, HOT_CUE_SLOTS, MAX_BPM, MIN_BPM, NUM_BANKS, SEQ_STEPS};

/// Integer map keys are stored as strings; this is the only place they are parsed
fn int_key<T: FromStr>(key: &str) -> Option<T> {
    key.trim().parse().ok()
}

fn object<'a>(field: &str, value: &'a Value) -> Option<&'a Map<String, Value>> {
    let obj = value.as_object();
    if obj.is_none() {
        log::warn!("[SESSION] '{}' is not an object, ignoring", field);
    }
    obj
}

fn skip(field: &str, key: &str, why: &str) {
    log::warn!("[SESSION] Skipping {}[{:?}]: {}", field, key, why);
}

pub(super) fn from_value(value: &Value) -> Session {
    let mut session = Session::default();
    let Some(root) = object("<root>", value) else {
        return session;
    };

    if let Some(v) = root.get("banks") {
        read_banks(v, &mut session);
    }
    match (root.get("sequencer"), root.get("curves")) {
        (Some(v), _) => read_sequencer(v, &mut session),
        (None, Some(v)) => {
            log::info!("[SESSION] Migrating legacy 'curves' to step patterns");
            read_curves(v, &mut session);
        }
        (None, None) => {}
    }
    if let Some(v) = root.get("hot_cues") {
        read_hot_cues(v, &mut session);
    }
    if let Some(v) = root.get("loops") {
        read_loops(v, &mut session);
    }
    if let Some(v) = root.get("keys") {
        read_keys(v, &mut session);
    }
    if let Some(v) = root.get("midi") {
        read_midi(v, &mut session);
    }
    if let Some(v) = root.get("master_bpm") {
        match v.as_f64().filter(|b| b.is_finite() && *b > 0.0) {
            Some(bpm) => session.master_bpm = Some(bpm.clamp(MIN_BPM, MAX_BPM)),
            None => log::warn!("[SESSION] Ignoring invalid master_bpm {}", v),
        }
    }
    session
}

fn read_banks(value: &Value, session: &mut Session) {
    let Some(banks) = object("banks", value) else {
        return;
    };
    for (key, pads) in banks {
        let Some(bank) = int_key::<usize>(key).filter(|b| *b < NUM_BANKS) else {
            skip("banks", key, "not a bank index");
            continue;
        };
        let Some(pads) = object("banks[..]", pads) else {
            continue;
        };
        for (pad, path) in pads {
            let deck = single_char(pad).and_then(DeckId::from_pad_key);
            let Some(deck) = deck else {
                skip("banks", pad, "not a pad key");
                continue;
            };
            match path {
                Value::String(p) if !p.is_empty() => {
                    session.banks[bank][deck.0] = Some(PathBuf::from(p))
                }
                Value::String(_) | Value::Null => {}
                _ => skip("banks", pad, "path is not a string"),
            }
        }
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn read_points(field: &str, value: &Value) -> StepPattern {
    let mut pattern = StepPattern::new();
    let Some(points) = object(field, value) else {
        return pattern;
    };
    for (key, pos) in points {
        let step = int_key::<u32>(key).filter(|s| *s < SEQ_STEPS);
        match (step, pos.as_f64()) {
            (Some(step), Some(pos)) if pattern.set(step, pos) => {}
            _ => skip(field, key, "invalid step or position"),
        }
    }
    pattern
}

fn read_sequencer(value: &Value, session: &mut Session) {
    let Some(clips) = object("sequencer", value) else {
        return;
    };
    for (path, entry) in clips {
        let Some(entry) = object("sequencer[..]", entry) else {
            continue;
        };
        let pattern = entry
            .get("points")
            .map(|p| read_points("sequencer.points", p))
            .unwrap_or_default();
        let start = entry.get("loop_start").and_then(Value::as_u64).unwrap_or(0);
        let length = entry
            .get("loop_length")
            .and_then(Value::as_u64)
            .unwrap_or(SEQ_STEPS as u64);
        let window = LoopWindow::new(
            start.min(u32::MAX as u64) as u32,
            length.min(u32::MAX as u64) as u32,
        );

        let clip = session.clip_mut(&PathBuf::from(path));
        clip.pattern = pattern;
        clip.loop_window = window;
    }
}

fn read_curves(value: &Value, session: &mut Session) {
    let Some(clips) = object("curves", value) else {
        return;
    };
    for (path, points) in clips {
        if points.is_null() {
            continue;
        }
        let clip = session.clip_mut(&PathBuf::from(path));
        clip.pattern = read_points("curves", points);
        clip.loop_window = LoopWindow::default();
    }
}

fn read_hot_cues(value: &Value, session: &mut Session) {
    let Some(clips) = object("hot_cues", value) else {
        return;
    };
    for (path, cues) in clips {
        let Some(cues) = object("hot_cues[..]", cues) else {
            continue;
        };
        let mut slots = std::collections::BTreeMap::new();
        for (key, ms) in cues {
            let slot = int_key::<u8>(key).filter(|s| (1..=HOT_CUE_SLOTS).contains(s));
            let ms = ms
                .as_u64()
                .or_else(|| ms.as_f64().filter(|v| *v >= 0.0 && v.is_finite()).map(|v| v as u64));
            match (slot, ms) {
                (Some(slot), Some(ms)) => {
                    slots.insert(slot, ms);
                }
                _ => skip("hot_cues", key, "invalid slot or position"),
            }
        }
        if !slots.is_empty() {
            session.clip_mut(&PathBuf::from(path)).hot_cues = slots;
        }
    }
}

fn read_loops(value: &Value, session: &mut Session) {
    let Some(clips) = object("loops", value) else {
        return;
    };
    for (path, flag) in clips {
        match flag.as_bool() {
            Some(flag) => session.clip_mut(&PathBuf::from(path)).looping = Some(flag),
            None => skip("loops", path, "not a boolean"),
        }
    }
}

fn read_keys(value: &Value, session: &mut Session) {
    let Some(keys) = object("keys", value) else {
        return;
    };
    for (name, code) in keys {
        let action = Action::from_str(name);
        let code = code.as_u64().and_then(|c| u32::try_from(c).ok());
        match (action, code) {
            (Ok(action), Some(code)) => session.keys.push((action, code)),
            (Err(e), _) => skip("keys", name, &e.to_string()),
            (_, None) => skip("keys", name, "key code is not an integer"),
        }
    }
}

fn read_midi(value: &Value, session: &mut Session) {
    let Some(midi) = object("midi", value) else {
        return;
    };
    for (name, binding) in midi {
        let action = match Action::from_str(name) {
            Ok(action) => action,
            Err(e) => {
                skip("midi", name, &e.to_string());
                continue;
            }
        };
        if binding.is_null() {
            session.midi.push((action, None));
            continue;
        }
        match serde_json::from_value::<MidiBinding>(binding.clone()) {
            Ok(binding) => session.midi.push((action, Some(binding))),
            Err(e) => skip("midi", name, &e.to_string()),
        }
    }
}

pub(super) fn to_value(session: &Session) -> Value {
    let mut root = Map::new();

    let mut banks = Map::new();
    for (i, slots) in session.banks.iter().enumerate() {
        let pads: Map<String, Value> = slots
            .iter()
            .enumerate()
            .filter_map(|(deck, path)| {
                let path = path.as_ref()?;
                Some((
                    DeckId(deck).pad_key().to_string(),
                    json!(path.to_string_lossy()),
                ))
            })
            .collect();
        if !pads.is_empty() {
            banks.insert(i.to_string(), Value::Object(pads));
        }
    }
    root.insert("banks".into(), Value::Object(banks));

    let mut sequencer = Map::new();
    let mut hot_cues = Map::new();
    let mut loops = Map::new();
    for (path, clip) in &session.clips {
        let key = path.to_string_lossy().into_owned();
        if !clip.pattern.is_empty() || clip.loop_window != LoopWindow::default() {
            let points: Map<String, Value> = clip
                .pattern
                .iter()
                .map(|(step, pos)| (step.to_string(), json!(pos)))
                .collect();
            sequencer.insert(
                key.clone(),
                json!({
                    "points": points,
                    "loop_start": clip.loop_window.start(),
                    "loop_length": clip.loop_window.length(),
                }),
            );
        }
        if !clip.hot_cues.is_empty() {
            let cues: Map<String, Value> = clip
                .hot_cues
                .iter()
                .map(|(slot, ms)| (slot.to_string(), json!(ms)))
                .collect();
            hot_cues.insert(key.clone(), Value::Object(cues));
        }
        if let Some(flag) = clip.looping {
            loops.insert(key, json!(flag));
        }
    }
    root.insert("sequencer".into(), Value::Object(sequencer));
    root.insert("hot_cues".into(), Value::Object(hot_cues));
    root.insert("loops".into(), Value::Object(loops));

    let keys: Map<String, Value> = session
        .keys
        .iter()
        .map(|(action, code)| (action.to_string(), json!(code)))
        .collect();
    root.insert("keys".into(), Value::Object(keys));

    let midi: Map<String, Value> = session
        .midi
        .iter()
        .map(|(action, binding)| (action.to_string(), json!(binding)))
        .collect();
    root.insert("midi".into(), Value::Object(midi));

    if let Some(bpm) = session.master_bpm {
        root.insert("master_bpm".into(), json!(bpm));
    }
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_integer_keys_written_as_strings() {
        let mut session = Session::default();
        session.banks[1][2] = Some(PathBuf::from("/c/x.mp4"));
        let clip = session.clip_mut(Path::new("/c/x.mp4"));
        clip.pattern.set(16, 0.5);
        clip.hot_cues.insert(3, 2500);

        let value = to_value(&session);
        assert_eq!(value["banks"]["1"]["d"], json!("/c/x.mp4"));
        assert_eq!(value["sequencer"]["/c/x.mp4"]["points"]["16"], json!(0.5));
        assert_eq!(value["sequencer"]["/c/x.mp4"]["loop_length"], json!(64));
        assert_eq!(value["hot_cues"]["/c/x.mp4"]["3"], json!(2500));
    }

    #[test]
    fn test_bad_fields_fail_closed() {
        let value = json!({
            "banks": "not an object",
            "sequencer": {
                "/c/a.mp4": { "points": { "0": 0.0, "x": 0.5, "99": 0.5, "4": "half" }, "loop_length": 16 }
            },
            "hot_cues": { "/c/a.mp4": { "1": 1000, "9": 50, "2": -4 } },
            "loops": { "/c/a.mp4": "yes", "/c/b.mp4": false },
            "keys": { "PLAY_PAUSE": 32, "MADE_UP": 1, "TAP_TEMPO": "enter" },
            "midi": { "FADER_A": { "type": "control_change", "val": 7 }, "TRIGGER_S": { "type": "pitch_bend" }, "TAP_TEMPO": null },
            "master_bpm": "fast"
        });
        let session = from_value(&value);

        assert!(session.banks.iter().all(|b| b.iter().all(Option::is_none)));
        let a = &session.clips[Path::new("/c/a.mp4")];
        assert_eq!(a.pattern.len(), 1);
        assert_eq!(a.pattern.get(0), Some(0.0));
        assert_eq!(a.loop_window, LoopWindow::new(0, 16));
        assert_eq!(a.hot_cues.len(), 1);
        assert_eq!(a.hot_cues[&1], 1000);
        assert_eq!(a.looping, None);
        assert_eq!(session.clips[Path::new("/c/b.mp4")].looping, Some(false));
        assert_eq!(session.keys, vec![(Action::PlayPause, 32)]);
        assert_eq!(
            session.midi,
            vec![
                (Action::Fader(DeckId(0)), Some(MidiBinding::cc(7))),
                (Action::TapTempo, None),
            ]
        );
        assert_eq!(session.master_bpm, None);
    }

    #[test]
    fn test_legacy_curves_migrate() {
        let value = json!({
            "banks": { "0": { "a": "/c/old.mp4" } },
            "curves": { "/c/old.mp4": { "0": 0.25, "32": 0.75 }, "/c/none.mp4": null }
        });
        let session = from_value(&value);
        let clip = &session.clips[Path::new("/c/old.mp4")];
        assert_eq!(clip.pattern.get(32), Some(0.75));
        assert_eq!(clip.loop_window, LoopWindow::default());
        assert!(!session.clips.contains_key(Path::new("/c/none.mp4")));
        assert_eq!(session.banks[0][0], Some(PathBuf::from("/c/old.mp4")));
    }

    #[test]
    fn test_sequencer_wins_over_curves() {
        let value = json!({
            "sequencer": { "/c/a.mp4": { "points": { "8": 0.5 } } },
            "curves": { "/c/a.mp4": { "0": 0.1 } }
        });
        let session = from_value(&value);
        let clip = &session.clips[Path::new("/c/a.mp4")];
        assert_eq!(clip.pattern.get(8), Some(0.5));
        assert_eq!(clip.pattern.get(0), None);
    }

    #[test]
    fn test_non_object_root_gives_defaults() {
        assert_eq!(from_value(&json!([1, 2, 3])), Session::default());
    }

    #[test]
    fn test_master_bpm_clamped() {
        assert_eq!(from_value(&json!({"master_bpm": 900.0})).master_bpm, Some(MAX_BPM));
        assert_eq!(from_value(&json!({"master_bpm": 0})).master_bpm, None);
    }
}
