//! Duplex audio host built on cpal
//!
//! - **Input stream**: captures frames into a lock-free ring
//! - **Output stream**: owns the `FlattenEngine`, pulls from the ring,
//!   flattens and plays
//! - **Console thread**: drives the engine through its `FlattenController`
//!
//! ```ignore
//! let system = start_duplex(&live.audio, &live.flattener)?;
//! system.controller.set_target_pitch(220.0)?;
//! let telemetry = system.controller.telemetry();
//! ```

mod backend;
mod config;
mod device;
mod error;

pub use backend::{start_duplex, AudioSystem, StreamCounters};
pub use config::{AudioConfig, BufferSize};
pub use device::list_devices;
