use crate::config::{DerivedParameters, PingerConfig};
use crate::math::matrix::MatrixHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{Channel, CHANNEL_COUNT};
use ndarray::{array, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Sensor coordinates, one row per channel: (0,d,0), (d,0,0), (0,−d,0), (−d,0,0).
#[derive(Debug, Clone, PartialEq)]
pub struct SensorArray {
    positions: Array2<f64>,
    half_spacing: f64,
}

impl SensorArray {
    pub fn square(half_spacing: f64) -> Self {
        let d = half_spacing;
        Self {
            positions: array![
                [0.0, d, 0.0],
                [d, 0.0, 0.0],
                [0.0, -d, 0.0],
                [-d, 0.0, 0.0]
            ],
            half_spacing,
        }
    }

    pub fn half_spacing(&self) -> f64 {
        self.half_spacing
    }

    pub fn positions(&self) -> ArrayView2<'_, f64> {
        self.positions.view()
    }

    pub fn position(&self, channel: Channel) -> [f64; 3] {
        let row = self.positions.row(channel.index());
        [row[0], row[1], row[2]]
    }

    pub fn distance(&self, a: Channel, b: Channel) -> f64 {
        MatrixHelper::row_distance(self.positions.view(), a.index(), b.index())
    }

    pub fn distances(&self) -> Array2<f64> {
        MatrixHelper::distance_matrix(self.positions.view())
    }
}

/// Estimated pinger location in array coordinates [m]; z < 0 is below the array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("sphere radii inconsistent: opposite pairs differ by {mismatch:.4e} m², allowed {allowed:.4e} m²")]
    Inconsistent { mismatch: f64, allowed: f64 },
    #[error("no real solution: z² = {z_squared:.4e} m²")]
    ComplexSolution { z_squared: f64 },
    #[error("non-finite {0}")]
    NonFinite(&'static str),
}

pub struct GeolocationSolver {
    array: SensorArray,
    sound_speed: f64,
    /// Range slack ε [m].
    range_tolerance: f64,
}

impl GeolocationSolver {
    pub fn new(config: &PingerConfig, params: &DerivedParameters) -> Self {
        Self {
            array: SensorArray::square(params.half_spacing),
            sound_speed: config.sound_speed,
            range_tolerance: config.range_tolerance_samples
                * config.sound_speed
                * params.sample_period,
        }
    }

    pub fn array(&self) -> &SensorArray {
        &self.array
    }

    /// r_i = vP·(TOA + tD_i), with tD_1 = 0.
    pub fn sphere_radii(&self, toa: f64, delays: [f64; 3]) -> [f64; CHANNEL_COUNT] {
        let [d2, d3, d4] = delays;
        [toa, toa + d2, toa + d3, toa + d4].map(|time| self.sound_speed * time)
    }

    pub fn solve(&self, radii: [f64; CHANNEL_COUNT]) -> Result<PingerPosition, GeometryError> {
        if radii.iter().any(|r| !r.is_finite()) {
            return Err(GeometryError::NonFinite("sphere radius"));
        }
        let d = self.array.half_spacing;
        let [r1, r2, r3, r4] = radii;
        let sq = |r: f64| r * r;

        // (r1²+r3²)/2 and (r2²+r4²)/2 both estimate R² + d².
        let opposite_13 = (sq(r1) + sq(r3)) / 2.0;
        let opposite_24 = (sq(r2) + sq(r4)) / 2.0;
        let mean_radius = StatsHelper::mean(&radii).unwrap_or(0.0).abs();
        let mismatch = (opposite_13 - opposite_24).abs();
        let allowed = d * d + 2.0 * mean_radius * self.range_tolerance;
        if mismatch > allowed {
            return Err(GeometryError::Inconsistent { mismatch, allowed });
        }

        let x = (sq(r4) - sq(r2)) / (4.0 * d);
        let y = (sq(r3) - sq(r1)) / (4.0 * d);
        let z_squared = (opposite_13 + opposite_24) / 2.0 - d * d - x * x - y * y;
        if !z_squared.is_finite() {
            return Err(GeometryError::NonFinite("depth term"));
        }
        if z_squared < 0.0 {
            return Err(GeometryError::ComplexSolution { z_squared });
        }

        let position = PingerPosition {
            x,
            y,
            z: -z_squared.sqrt(),
        };
        if [position.x, position.y, position.z].iter().all(|v| v.is_finite()) {
            Ok(position)
        } else {
            Err(GeometryError::NonFinite("position"))
        }
    }

    pub fn locate(&self, toa: f64, delays: [f64; 3]) -> Result<PingerPosition, GeometryError> {
        self.solve(self.sphere_radii(toa, delays))
    }
}
