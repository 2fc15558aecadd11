use serde::{Deserialize, Serialize};

/// Ground truth for a simulated pinger and the front end that hears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Horizontal bearing, clockwise from the sensor-1 axis [deg].
    pub bearing_deg: f64,
    pub horizontal_range: f64,
    /// Depth below the array plane [m].
    pub depth: f64,
    /// True pulse repetition period [s].
    pub prt: f64,
    /// Emission time of the first pulse on the acquisition clock [s].
    pub emission_offset: f64,
    /// Received amplitude at one meter, before gain.
    pub source_level: f64,
    /// Half width of the uniform noise added to every sample.
    pub noise: f64,
    pub seed: u64,
    /// Carrier cycles in the linear attack ramp.
    pub attack_cycles: f64,
    pub initial_gain: f64,
    pub gain_step: f64,
    pub min_gain: f64,
    pub max_gain: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            bearing_deg: 40.0,
            horizontal_range: 25.0,
            depth: 12.0,
            prt: 2.0,
            emission_offset: 1.5e-3,
            source_level: 12.0,
            noise: 0.01,
            seed: 7,
            attack_cycles: 3.0,
            initial_gain: 1.0,
            gain_step: 1.25,
            min_gain: 0.1,
            max_gain: 16.0,
        }
    }
}

impl ScenarioConfig {
    /// Pinger position in array coordinates.
    pub fn pinger_position(&self) -> [f64; 3] {
        let bearing = self.bearing_deg.to_radians();
        [
            self.horizontal_range * bearing.sin(),
            self.horizontal_range * bearing.cos(),
            -self.depth,
        ]
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.prt.is_finite() && self.prt > 0.0,
            "scenario prt must be positive, got {}",
            self.prt
        );
        anyhow::ensure!(
            self.horizontal_range >= 0.0 && self.depth >= 0.0,
            "scenario range and depth must not be negative"
        );
        anyhow::ensure!(self.noise >= 0.0, "noise must not be negative");
        anyhow::ensure!(
            self.min_gain > 0.0 && self.min_gain <= self.initial_gain && self.initial_gain <= self.max_gain,
            "initial gain {} outside [{}, {}]",
            self.initial_gain,
            self.min_gain,
            self.max_gain
        );
        anyhow::ensure!(self.gain_step > 1.0, "gain_step must exceed 1");
        Ok(())
    }
}
