//! Control thread - the single owner of engine state
//!
//! One `select!` loop multiplexes four sources:
//! - commands from hosts
//! - results from the analysis/stretch workers
//! - the envelope tick
//! - the step clock poll
//!
//! The engine moves into the thread on spawn and is handed back by
//! [`ControlHandle::shutdown`], so the host can persist its session.

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, SendError, Sender};

use super::command::EngineCommand;
use super::engine::PerformanceEngine;

/// Handle held by hosts
pub struct ControlHandle {
    command_tx: Sender<EngineCommand>,
    thread_handle: Option<JoinHandle<PerformanceEngine>>,
}

impl ControlHandle {
    pub fn send(&self, command: EngineCommand) -> Result<(), SendError<EngineCommand>> {
        self.command_tx.send(command)
    }

    /// Sender for other input sources (MIDI, UI)
    pub fn sender(&self) -> Sender<EngineCommand> {
        self.command_tx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop and take the engine back
    ///
    /// Returns `None` if the thread already went away or panicked.
    pub fn shutdown(mut self) -> Option<PerformanceEngine> {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        let handle = self.thread_handle.take()?;
        match handle.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                log::error!("[CONTROL] Control thread panicked");
                None
            }
        }
    }
}

pub struct ControlThread;

impl ControlThread {
    /// Move the engine onto its own thread and start the loop
    pub fn spawn(engine: PerformanceEngine) -> io::Result<ControlHandle> {
        let (command_tx, command_rx) = channel::unbounded();

        let thread_handle = thread::Builder::new()
            .name("vidz-control".into())
            .spawn(move || Self::run(engine, command_rx))?;

        Ok(ControlHandle {
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }

    fn run(mut engine: PerformanceEngine, command_rx: Receiver<EngineCommand>) -> PerformanceEngine {
        let results = engine.result_receiver();
        let envelope_tick = channel::tick(engine.envelope_tick());
        let step_tick = channel::tick(engine.step_poll_interval());
        log::info!(
            "[CONTROL] Started (envelope tick {:?}, step poll {:?})",
            engine.envelope_tick(),
            engine.step_poll_interval()
        );

        loop {
            crossbeam::select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(EngineCommand::Shutdown) => {
                        log::info!("[CONTROL] Shutting down");
                        break;
                    }
                    Ok(cmd) => engine.apply(cmd),
                    Err(_) => {
                        log::info!("[CONTROL] Command channel closed, shutting down");
                        break;
                    }
                },
                recv(results) -> result => {
                    if let Ok(result) = result {
                        engine.handle_service_result(result);
                    }
                }
                recv(envelope_tick) -> _ => engine.tick_envelopes(),
                recv(step_tick) -> _ => {
                    engine.poll_step_clock();
                    engine.poll_stutters();
                }
            }
        }

        engine.shutdown_workers();
        log::info!("[CONTROL] Stopped");
        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MediaAnalyzer;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::engine::transport::SimOutputs;
    use crate::services::ServiceWorkers;
    use crate::types::{DeckId, SeqRate};
    use std::sync::Arc;

    fn engine() -> PerformanceEngine {
        let clock = Arc::new(ManualClock::new());
        let workers = ServiceWorkers::new(1, Arc::new(MediaAnalyzer::new(std::env::temp_dir())), None).unwrap();
        PerformanceEngine::new(
            EngineConfig::default(),
            clock.clone(),
            &SimOutputs::new(clock),
            workers,
        )
    }

    #[test]
    fn test_commands_applied_in_order() {
        let control = ControlThread::spawn(engine()).unwrap();
        assert!(control.is_running());
        control.send(EngineCommand::SetMasterBpm { bpm: 140.0 }).unwrap();
        control.send(EngineCommand::NudgeBpm { delta: 1.0 }).unwrap();
        control.send(EngineCommand::SetSeqRate { rate: SeqRate::Double }).unwrap();
        control
            .send(EngineCommand::SetFader {
                deck: DeckId(2),
                value: 0.25,
            })
            .unwrap();

        let engine = control.shutdown().unwrap();
        assert_eq!(engine.master_bpm(), 141.0);
        assert_eq!(engine.step_clock().rate(), SeqRate::Double);
        assert_eq!(engine.deck(DeckId(2)).volume(), 0.25);
    }

    #[test]
    fn test_extra_senders_reach_the_loop() {
        let control = ControlThread::spawn(engine()).unwrap();
        let tx = control.sender();
        std::thread::spawn(move || {
            tx.send(EngineCommand::SwitchBank { bank: 2 }).unwrap();
        })
        .join()
        .unwrap();

        let engine = control.shutdown().unwrap();
        assert_eq!(engine.current_bank(), 2);
    }
}
