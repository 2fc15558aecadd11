//! Signal-processing and TDOA geolocation core for a four-hydrophone pinger
//! tracker.
//!
//! Each pulse period the [`cycle::CycleOrchestrator`] samples the array through
//! the [`interface`] traits, filters the frames, synchronizes to the pinger's
//! repetition timing, extracts arrival-time differences, solves for the pinger
//! position and reports smoothed azimuths.

pub mod config;
pub mod cycle;
pub mod interface;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use config::{DerivedParameters, PingerConfig};
pub use cycle::{CycleFault, CycleOrchestrator, CycleOutcome};
pub use interface::AzimuthReport;
pub use prelude::{Channel, ChannelSet, Frame, PipelineError, PipelineResult};
