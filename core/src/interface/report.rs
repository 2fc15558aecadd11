use crate::processing::azimuth::Azimuths;
use crate::processing::geolocation::PingerPosition;
use serde::{Deserialize, Serialize};

/// Azimuth estimate emitted by one successful locked cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzimuthReport {
    pub cycle: u64,
    /// Acquisition-clock start time of the cycle's frames [s].
    pub timestamp: f64,
    pub raw: Azimuths,
    pub smoothed: Azimuths,
    pub position: PingerPosition,
    pub prt: f64,
}
