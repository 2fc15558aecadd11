pub mod azimuth;
pub mod geolocation;
pub mod spectral;
pub mod sync;
pub mod toa;

pub use azimuth::{AzimuthEstimator, AzimuthHistory, Azimuths};
pub use geolocation::{GeolocationSolver, GeometryError, PingerPosition, SensorArray};
pub use spectral::{BandpassMask, FilteredFrame, SpectralEngine, Spectrum};
pub use sync::{HeadObservation, SyncController, SyncState, SyncStatus};
pub use toa::{ReconcilePolicy, Reconciliation, ToaExtractor, ToaFault, ToaSet};
