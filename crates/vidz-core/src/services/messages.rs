//! Request/result types exchanged between the control thread and workers

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analysis::{AnalysisError, ClipAnalysis};
use crate::timestretch::StretchError;
use crate::types::ClipId;

/// Failure reported by a worker
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Stretch failed: {0}")]
    Stretch(#[from] StretchError),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl ServiceError {
    /// Whether the job stopped because its interrupt flag was raised
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ServiceError::Analysis(AnalysisError::Cancelled)
                | ServiceError::Stretch(StretchError::Cancelled)
        )
    }
}

/// Result of analysing one clip
#[derive(Debug)]
pub struct AnalysisOutcome {
    /// Job ID matching the submitted request
    pub id: u64,
    pub clip: ClipId,
    pub path: PathBuf,
    /// Analysis generation the request was issued under (bumped on bank switch)
    pub generation: u64,
    pub result: Result<ClipAnalysis, ServiceError>,
}

/// Result of rendering one pitch-corrected rendition
#[derive(Debug)]
pub struct StretchOutcome {
    /// Job ID matching the submitted request
    pub id: u64,
    pub clip: ClipId,
    /// Per-clip rendition generation the request was tagged with
    pub generation: u64,
    pub ratio: f64,
    /// Rendered file on success
    pub result: Result<PathBuf, ServiceError>,
}

/// Everything workers post back to the control thread
#[derive(Debug)]
pub enum ServiceResult {
    Analysis(AnalysisOutcome),
    Stretch(StretchOutcome),
}

/// Handle to an in-flight job
///
/// Interrupting is cooperative: the worker notices at its next checkpoint,
/// and a result is reported either way.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: u64,
    cancel: Arc<AtomicBool>,
}

impl JobHandle {
    pub(crate) fn new(id: u64, cancel: Arc<AtomicBool>) -> Self {
        Self { id, cancel }
    }

    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
