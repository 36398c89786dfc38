//! Worker pool that runs analysis and stretch jobs

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};

use super::messages::{AnalysisOutcome, JobHandle, ServiceError, ServiceResult, StretchOutcome};
use crate::analysis::Analyzer;
use crate::timestretch::StretchBackend;
use crate::types::ClipId;

type ActiveJobs = Arc<Mutex<HashMap<u64, Arc<AtomicBool>>>>;

/// Runs analysis and stretch requests on a rayon pool
///
/// - `submit_*()` launches a job (non-blocking) and returns its handle
/// - `result_receiver()` is drained by the control thread
/// - `shutdown()` interrupts everything and waits a bounded time
pub struct ServiceWorkers {
    pool: rayon::ThreadPool,
    analyzer: Arc<dyn Analyzer>,
    stretcher: Option<Arc<dyn StretchBackend>>,
    result_tx: Sender<ServiceResult>,
    result_rx: Receiver<ServiceResult>,
    /// Monotonic job counter
    next_id: AtomicU64,
    /// Interrupt flags of jobs that haven't reported yet
    active: ActiveJobs,
    /// Jobs launched but not yet reported
    in_flight: Arc<AtomicUsize>,
}

impl ServiceWorkers {
    /// Create the pool. `threads == 0` lets rayon pick.
    pub fn new(
        threads: usize,
        analyzer: Arc<dyn Analyzer>,
        stretcher: Option<Arc<dyn StretchBackend>>,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("vidz-worker-{}", i))
            .build()?;
        let (result_tx, result_rx) = unbounded();

        Ok(Self {
            pool,
            analyzer,
            stretcher,
            result_tx,
            result_rx,
            next_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Whether pitch-corrected renders can be produced
    pub fn can_stretch(&self) -> bool {
        self.stretcher.is_some()
    }

    /// Channel the control thread drains
    pub fn result_receiver(&self) -> Receiver<ServiceResult> {
        self.result_rx.clone()
    }

    /// Jobs launched but not yet reported
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Analyse a clip
    pub fn submit_analysis(&self, clip: ClipId, path: PathBuf, generation: u64) -> JobHandle {
        let analyzer = self.analyzer.clone();
        let job_path = path.clone();

        self.spawn_job(
            move |cancel| {
                let start = Instant::now();
                let result = analyzer.analyze(&job_path, cancel);
                match &result {
                    Ok(a) => log::info!(
                        "[ANALYSIS] {:?}: {:.1} BPM, {} ms (took {:?})",
                        job_path,
                        a.metadata.estimated_tempo_bpm,
                        a.metadata.duration_ms,
                        start.elapsed()
                    ),
                    Err(e) => log::warn!("[ANALYSIS] {:?} failed: {}", job_path, e),
                }
                result.map_err(ServiceError::from)
            },
            move |id, result| {
                ServiceResult::Analysis(AnalysisOutcome {
                    id,
                    clip,
                    path,
                    generation,
                    result,
                })
            },
        )
    }

    /// Render a pitch-corrected rendition of `source` at `ratio` into `output`
    ///
    /// Returns `None` when no backend is available.
    pub fn submit_stretch(
        &self,
        clip: ClipId,
        generation: u64,
        ratio: f64,
        source: PathBuf,
        output: PathBuf,
    ) -> Option<JobHandle> {
        let backend = self.stretcher.clone()?;

        Some(self.spawn_job(
            move |cancel| {
                let start = Instant::now();
                render_to(backend.as_ref(), &source, ratio, &output, cancel)?;
                log::info!(
                    "[STRETCH] {} rendered {:?} at {:.3}x (gen {}) in {:?}",
                    backend.name(),
                    output.file_name().unwrap_or_default(),
                    ratio,
                    generation,
                    start.elapsed()
                );
                Ok(output)
            },
            move |id, result| {
                ServiceResult::Stretch(StretchOutcome {
                    id,
                    clip,
                    generation,
                    ratio,
                    result,
                })
            },
        ))
    }

    /// Launch a job. `report` turns its outcome into the posted result.
    fn spawn_job<T, W, R>(&self, work: W, report: R) -> JobHandle
    where
        T: Send + 'static,
        W: FnOnce(&AtomicBool) -> Result<T, ServiceError> + Send + 'static,
        R: FnOnce(u64, Result<T, ServiceError>) -> ServiceResult + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(AtomicBool::new(false));
        if let Ok(mut active) = self.active.lock() {
            active.insert(id, cancel.clone());
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let flag = cancel.clone();
        let tx = self.result_tx.clone();
        let active = self.active.clone();
        let in_flight = self.in_flight.clone();

        self.pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&flag)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    log::error!("[WORKER] Job {} panicked: {}", id, message);
                    Err(ServiceError::Panicked(message))
                });

            if let Ok(mut active) = active.lock() {
                active.remove(&id);
            }
            if tx.send(report(id, outcome)).is_err() {
                log::debug!("[WORKER] Result for job {} dropped, receiver gone", id);
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        JobHandle::new(id, cancel)
    }

    /// Raise the interrupt flag of every in-flight job
    pub fn interrupt_all(&self) {
        if let Ok(active) = self.active.lock() {
            for flag in active.values() {
                flag.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Interrupt all jobs and wait up to `timeout` for them to report
    ///
    /// Returns true if every job finished in time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.interrupt_all();
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                log::warn!(
                    "[WORKER] {} job(s) still running after {:?}, abandoning",
                    self.in_flight(),
                    timeout
                );
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }
}

fn render_to(
    backend: &dyn StretchBackend,
    source: &Path,
    ratio: f64,
    output: &Path,
    cancel: &AtomicBool,
) -> Result<(), ServiceError> {
    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir).map_err(crate::timestretch::StretchError::from)?;
    }
    backend.render(source, ratio, output, cancel)?;
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, ClipAnalysis};
    use crate::clip::{ClipAudio, ClipMetadata};
    use crate::timestretch::StretchError;

    struct FixedAnalyzer;

    impl Analyzer for FixedAnalyzer {
        fn analyze(&self, path: &Path, _cancel: &AtomicBool) -> Result<ClipAnalysis, AnalysisError> {
            if path.ends_with("panic.wav") {
                panic!("decoder blew up");
            }
            Ok(ClipAnalysis {
                metadata: ClipMetadata {
                    path: path.to_path_buf(),
                    estimated_tempo_bpm: 100.0,
                    duration_ms: 4000,
                },
                audio: ClipAudio::default(),
            })
        }
    }

    /// Spins until interrupted
    struct BlockingBackend;

    impl StretchBackend for BlockingBackend {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn render(&self, _: &Path, _: f64, _: &Path, cancel: &AtomicBool) -> Result<(), StretchError> {
            while !cancel.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(StretchError::Cancelled)
        }
    }

    fn workers(stretcher: Option<Arc<dyn StretchBackend>>) -> ServiceWorkers {
        ServiceWorkers::new(2, Arc::new(FixedAnalyzer), stretcher).unwrap()
    }

    #[test]
    fn test_analysis_result_is_posted() {
        let workers = workers(None);
        let handle = workers.submit_analysis(ClipId(3), PathBuf::from("/clips/a.wav"), 7);

        match workers.result_receiver().recv_timeout(Duration::from_secs(5)).unwrap() {
            ServiceResult::Analysis(outcome) => {
                assert_eq!(outcome.id, handle.id);
                assert_eq!(outcome.clip, ClipId(3));
                assert_eq!(outcome.generation, 7);
                assert_eq!(outcome.result.unwrap().metadata.duration_ms, 4000);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_panic_becomes_failed_result() {
        let workers = workers(None);
        workers.submit_analysis(ClipId(0), PathBuf::from("/clips/panic.wav"), 1);

        match workers.result_receiver().recv_timeout(Duration::from_secs(5)).unwrap() {
            ServiceResult::Analysis(outcome) => {
                assert!(matches!(outcome.result, Err(ServiceError::Panicked(ref m)) if m.contains("blew up")));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(workers.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn test_no_backend_means_no_stretch() {
        let workers = workers(None);
        assert!(!workers.can_stretch());
        let handle = workers.submit_stretch(
            ClipId(0),
            1,
            1.2,
            PathBuf::from("in.wav"),
            PathBuf::from("out.wav"),
        );
        assert!(handle.is_none());
    }

    #[test]
    fn test_interrupted_stretch_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let workers = workers(Some(Arc::new(BlockingBackend)));
        let handle = workers
            .submit_stretch(
                ClipId(1),
                4,
                1.2,
                dir.path().join("in.wav"),
                dir.path().join("out").join("r.wav"),
            )
            .unwrap();

        handle.interrupt();
        match workers.result_receiver().recv_timeout(Duration::from_secs(5)).unwrap() {
            ServiceResult::Stretch(outcome) => {
                assert_eq!(outcome.generation, 4);
                assert!(outcome.result.unwrap_err().is_cancelled());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_interrupts_in_flight_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let workers = workers(Some(Arc::new(BlockingBackend)));
        for generation in 0..3 {
            workers.submit_stretch(
                ClipId(0),
                generation,
                1.5,
                dir.path().join("in.wav"),
                dir.path().join(format!("{}.wav", generation)),
            );
        }
        assert!(workers.shutdown(Duration::from_secs(5)));
        assert_eq!(workers.in_flight(), 0);
        assert_eq!(workers.result_receiver().try_iter().count(), 3);
    }
}
