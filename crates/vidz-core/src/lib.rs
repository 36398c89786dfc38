//! Vidz Core - deck sync and step-sequencing engine for live A/V performance

pub mod analysis;
pub mod clip;
pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod services;
pub mod session;
pub mod timestretch;
pub mod types;

pub use types::*;
