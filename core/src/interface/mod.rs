pub mod hardware;
pub mod report;

pub use hardware::{Acquisition, GainControl, GainDirection, PeriodTimer};
pub use report::AzimuthReport;
