//! vidz player - headless 4-deck clip performance host
//!
//! This binary renders no picture and plays no sound. Decks drive clock-driven
//! simulated transports ([`SimOutputs`]); positions, rates, envelope levels and
//! renditions all behave as they would on real outputs, and the log shows what
//! each deck does. Hosts with video and audio outputs plug their own
//! `OutputFactory` into `PerformanceEngine::new` in place of `SimOutputs`.
//!
//! Wires the engine to the outside world:
//! 1. Loads the YAML config and the saved session
//! 2. Starts the worker pool and the control thread
//! 3. Bridges an optional MIDI controller into the control thread
//! 4. Reads keys and commands from stdin until `quit` or EOF, then saves the session
//!
//! ## Command line flags
//!
//! - `--config <path>`: config file (default `~/.config/vidz/config.yaml`)
//! - `--session <path>`: session file (default `~/.config/vidz/session.json`)
//! - `--midi <pattern>`: connect to the MIDI input whose name contains `pattern`
//! - `--list-midi`: print the available MIDI inputs and exit

mod console;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam::channel::Sender;

use vidz_core::analysis::MediaAnalyzer;
use vidz_core::clock::{Clock, SystemClock};
use vidz_core::config::{
    default_config_path, default_session_path, load_config, save_config, EngineConfig,
};
use vidz_core::engine::{ControlThread, EngineCommand, PerformanceEngine, SimOutputs};
use vidz_core::services::ServiceWorkers;
use vidz_core::session::{Session, SessionError};
use vidz_core::timestretch::{backend_from_config, rendition_dir};
use vidz_midi::MidiInput;

use console::{parse_line, ConsoleLine};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if args.iter().any(|arg| arg == "--list-midi") {
        let ports = vidz_midi::list_input_ports().context("Failed to enumerate MIDI inputs")?;
        if ports.is_empty() {
            println!("No MIDI inputs");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    log::info!("vidz-player starting up");

    let config_path = arg_value(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_path("config.yaml"));
    let session_path = arg_value(&args, "--session")
        .map(PathBuf::from)
        .unwrap_or_else(default_session_path);

    let mut config: EngineConfig = load_config(&config_path);
    if !config_path.exists() {
        if let Err(e) = save_config(&config, &config_path) {
            log::warn!("Could not write default config: {:#}", e);
        }
    }
    if let Some(pattern) = arg_value(&args, "--midi") {
        config.midi.port_match = Some(pattern.to_string());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let stretcher = backend_from_config(&config.stretch);
    if stretcher.is_none() {
        log::warn!("No time-stretch backend available, tempo sync will use playback rate only");
    }
    let workers = ServiceWorkers::new(
        config.workers.threads,
        Arc::new(MediaAnalyzer::new(rendition_dir(&config.stretch))),
        stretcher,
    )
    .context("Failed to start worker pool")?;

    let midi_port = config.midi.port_match.clone();
    let outputs = SimOutputs::new(clock.clone());
    let mut engine = PerformanceEngine::new(config, clock, &outputs, workers);

    match Session::load(&session_path) {
        Ok(session) => engine.apply_session(&session),
        Err(SessionError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No session at {:?}, starting fresh", session_path);
        }
        Err(e) => log::warn!("Ignoring session {:?}: {}", session_path, e),
    }

    let control = ControlThread::spawn(engine).context("Failed to start control thread")?;

    // Held for the whole run; dropping it closes the port
    let _midi = match midi_port {
        Some(pattern) => match MidiInput::connect(&pattern) {
            Ok(input) => {
                spawn_midi_bridge(&input, control.sender())?;
                Some(input)
            }
            Err(e) => {
                log::warn!("MIDI disabled: {}", e);
                None
            }
        },
        None => None,
    };

    println!("vidz ready. Type key names (space, a, -a to release), `load <pad> <path>`, `bpm <n>` or `quit`.");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        match parse_line(&line) {
            ConsoleLine::Quit => break,
            ConsoleLine::Empty => {}
            ConsoleLine::Unknown(text) => println!("?? {}", text),
            ConsoleLine::Send(command) => {
                if control.send(command).is_err() {
                    log::error!("Control thread is gone");
                    break;
                }
            }
        }
    }

    log::info!("Shutting down");
    let engine = control.shutdown().context("Control thread panicked")?;
    engine.to_session().save(&session_path)?;
    Ok(())
}

/// Value following `flag`, if any
fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Forward MIDI events to the control thread until either side goes away
fn spawn_midi_bridge(input: &MidiInput, commands: Sender<EngineCommand>) -> Result<()> {
    let events = input.events();
    thread::Builder::new()
        .name("vidz-midi-bridge".to_string())
        .spawn(move || {
            while let Ok(event) = events.recv() {
                if commands.send(EngineCommand::Input(event)).is_err() {
                    break;
                }
            }
        })
        .context("Failed to start MIDI bridge")?;
    Ok(())
}
