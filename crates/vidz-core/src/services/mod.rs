//! Background workers for analysis and time-stretch renders
//!
//! # Architecture
//!
//! ```text
//! Control Thread                     Worker Pool (rayon)               Control Thread
//! ──────────────                     ───────────────────               ──────────────
//! submit_analysis() ──spawn──▶ Analyzer::analyze()
//! submit_stretch()  ──spawn──▶ StretchBackend::render()
//!                                     └ ServiceResult ──channel──▶ select! loop applies it
//! ```
//!
//! Workers never touch engine state. Each job gets an interrupt flag and
//! always posts exactly one result, including when it was cancelled or
//! panicked.

mod messages;
mod workers;

pub use messages::{AnalysisOutcome, JobHandle, ServiceError, ServiceResult, StretchOutcome};
pub use workers::ServiceWorkers;
