#![forbid(unsafe_code)]

//! Real-time respiration and sleep-stage inference from motion sensors.
//!
//! This crate provides:
//! - Domain types (samples, breath cycles, sleep stages, metrics snapshots)
//! - The signal pipeline (sensor streams, motion filter, breath detection,
//!   movement intensity, apnea detection, stage classification)
//! - Engine sessions and the handle layer used by bindings
//! - Configuration, logging, CSV recordings and synthetic signals

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod stream;
pub mod filter;
pub mod breath;
pub mod movement;
pub mod apnea;
pub mod classifier;
pub mod session;
pub mod handle;
pub mod recording;
pub mod synth;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use session::EngineSession;
pub use handle::SessionHandle;
pub use classifier::{ClassifierPhase, StageFeatures};
pub use apnea::ApneaState;
pub use recording::{load_recording, write_recording};
pub use synth::SignalBuilder;

pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 0;
pub const VERSION_PATCH: u32 = 0;
pub const VERSION: &str = "1.0.0";
