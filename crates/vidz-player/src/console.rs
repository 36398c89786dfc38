//! Line-based console input
//!
//! Each stdin line is either a key name, sent as a key press (`-` prefix for
//! a release), or one of a few direct commands:
//!
//! ```text
//! space            press Space
//! -a               release A
//! load s clip.mp4  load a clip onto deck S
//! bpm 128          set the master tempo
//! quit             save the session and exit
//! ```

use std::path::PathBuf;

use vidz_core::control::{key, InputEvent};
use vidz_core::engine::EngineCommand;
use vidz_core::types::DeckId;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Send(EngineCommand),
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Empty;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "quit" | "exit" => return ConsoleLine::Quit,
        "load" => return parse_load(rest).unwrap_or_else(|| ConsoleLine::Unknown(line.to_string())),
        "bpm" => {
            return match rest.parse::<f64>() {
                Ok(bpm) => ConsoleLine::Send(EngineCommand::SetMasterBpm { bpm }),
                Err(_) => ConsoleLine::Unknown(line.to_string()),
            }
        }
        _ => {}
    }

    if !rest.is_empty() {
        return ConsoleLine::Unknown(line.to_string());
    }
    let (release, name) = match word.strip_prefix('-') {
        Some(name) if !name.is_empty() => (true, name),
        _ => (false, word),
    };
    match key::from_name(name) {
        Some(code) if release => ConsoleLine::Send(EngineCommand::Input(InputEvent::KeyRelease(code))),
        Some(code) => ConsoleLine::Send(EngineCommand::Input(InputEvent::KeyPress(code))),
        None => ConsoleLine::Unknown(line.to_string()),
    }
}

fn parse_load(rest: &str) -> Option<ConsoleLine> {
    let (pad, path) = rest.split_once(char::is_whitespace)?;
    let mut chars = pad.chars();
    let deck = match (chars.next(), chars.next()) {
        (Some(c), None) => DeckId::from_pad_key(c)?,
        _ => return None,
    };
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    Some(ConsoleLine::Send(EngineCommand::LoadClip {
        deck,
        path: PathBuf::from(path),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_and_release() {
        assert_eq!(
            parse_line("space"),
            ConsoleLine::Send(EngineCommand::Input(InputEvent::KeyPress(key::SPACE)))
        );
        assert_eq!(
            parse_line("  -A "),
            ConsoleLine::Send(EngineCommand::Input(InputEvent::KeyRelease(key::ascii('a'))))
        );
        assert!(matches!(parse_line("-"), ConsoleLine::Unknown(_)));
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse_line("quit"), ConsoleLine::Quit);
        assert_eq!(parse_line(""), ConsoleLine::Empty);
        assert_eq!(
            parse_line("bpm 128.5"),
            ConsoleLine::Send(EngineCommand::SetMasterBpm { bpm: 128.5 })
        );
        assert_eq!(
            parse_line("load d /clips/my clip.mp4"),
            ConsoleLine::Send(EngineCommand::LoadClip {
                deck: DeckId(2),
                path: PathBuf::from("/clips/my clip.mp4"),
            })
        );
    }

    #[test]
    fn test_unknown_lines() {
        assert!(matches!(parse_line("bpm fast"), ConsoleLine::Unknown(_)));
        assert!(matches!(parse_line("load x a.mp4"), ConsoleLine::Unknown(_)));
        assert!(matches!(parse_line("space bar"), ConsoleLine::Unknown(_)));
        assert!(matches!(parse_line("f13"), ConsoleLine::Unknown(_)));
    }
}
