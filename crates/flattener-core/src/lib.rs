//! Pitch Flattener Core - real-time pitch tracking and flattening
//!
//! Tracks the fundamental of a monophonic source and drives a pitch shifter
//! so the output sits on a target (or latched) pitch.
//!
//! ```ignore
//! use flattener_core::{flatten_engine, FlattenerConfig, SignalsmithShifter};
//!
//! let shifter = SignalsmithShifter::new(48000, 512);
//! let (mut engine, mut controller) = flatten_engine(&FlattenerConfig::default(), 48000, 512, shifter)?;
//!
//! // Audio thread
//! engine.process(&mut block);
//!
//! // Control thread
//! controller.set_target_pitch(220.0)?;
//! let telemetry = controller.telemetry();
//! ```

pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod ratio;
pub mod shifter;
pub mod tracking;
pub mod types;

pub use config::FlattenerConfig;
pub use detection::{Algorithm, PitchEstimate};
pub use engine::{flatten_engine, FlattenController, FlattenEngine, TelemetrySnapshot};
pub use error::{FlattenError, FlattenResult};
pub use shifter::PitchShifter;
#[cfg(feature = "signalsmith")]
pub use shifter::SignalsmithShifter;
pub use types::*;
