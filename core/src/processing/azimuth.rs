use crate::config::PingerConfig;
use crate::math::stats::StatsHelper;
use crate::processing::geolocation::PingerPosition;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity window whose output is the median of its contents.
#[derive(Debug, Clone, PartialEq)]
pub struct AzimuthHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl AzimuthHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `value`, evicting the oldest entry when full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn median(&self) -> Option<f64> {
        let values: Vec<f64> = self.values.iter().copied().collect();
        StatsHelper::median(&values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Horizontal and vertical azimuths in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Azimuths {
    /// atan2(x, y): 0° toward sensor 1, 90° toward sensor 2.
    pub horizontal: f64,
    /// atan2(z, y).
    pub vertical_one: f64,
    /// atan2(z, x).
    pub vertical_two: f64,
}

impl Azimuths {
    pub fn from_position(position: &PingerPosition) -> Self {
        Self {
            horizontal: position.x.atan2(position.y).to_degrees(),
            vertical_one: position.z.atan2(position.y).to_degrees(),
            vertical_two: position.z.atan2(position.x).to_degrees(),
        }
    }
}

pub struct AzimuthEstimator {
    horizontal: AzimuthHistory,
    vertical_one: AzimuthHistory,
    vertical_two: AzimuthHistory,
}

impl AzimuthEstimator {
    pub fn new(config: &PingerConfig) -> Self {
        Self::with_capacity(config.history_size)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            horizontal: AzimuthHistory::new(capacity),
            vertical_one: AzimuthHistory::new(capacity),
            vertical_two: AzimuthHistory::new(capacity),
        }
    }

    /// Pushes one raw estimate and returns the smoothed azimuths.
    pub fn push(&mut self, raw: Azimuths) -> Azimuths {
        self.horizontal.push(raw.horizontal);
        self.vertical_one.push(raw.vertical_one);
        self.vertical_two.push(raw.vertical_two);
        self.smoothed().unwrap_or(raw)
    }

    pub fn smoothed(&self) -> Option<Azimuths> {
        Some(Azimuths {
            horizontal: self.horizontal.median()?,
            vertical_one: self.vertical_one.median()?,
            vertical_two: self.vertical_two.median()?,
        })
    }

    /// Number of estimates currently held (equal across the three histories).
    pub fn len(&self) -> usize {
        self.horizontal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_median_of_ten_values() {
        let mut history = AzimuthHistory::new(10);
        for value in [1.0, 3.0, 5.0, 7.0, 9.0, 2.0, 4.0, 6.0, 8.0, 10.0] {
            history.push(value);
        }
        assert_eq!(history.median(), Some(5.5));
    }

    #[test]
    fn history_median_of_three_values() {
        let mut history = AzimuthHistory::new(10);
        for value in [10.0, 20.0, 30.0] {
            history.push(value);
        }
        assert_eq!(history.median(), Some(20.0));
    }

    #[test]
    fn full_history_evicts_oldest() {
        let mut history = AzimuthHistory::new(3);
        for value in [100.0, 1.0, 2.0, 3.0] {
            history.push(value);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.median(), Some(2.0));
    }

    #[test]
    fn pinger_along_sensor_one_axis_is_zero_degrees() {
        let azimuths = Azimuths::from_position(&PingerPosition {
            x: 0.0,
            y: 20.0,
            z: -10.0,
        });
        assert_eq!(azimuths.horizontal, 0.0);
        assert!((azimuths.vertical_one - (-10.0f64).atan2(20.0).to_degrees()).abs() < 1e-12);
    }

    #[test]
    fn pinger_along_sensor_two_axis_is_ninety_degrees() {
        let azimuths = Azimuths::from_position(&PingerPosition {
            x: 15.0,
            y: 0.0,
            z: -15.0,
        });
        assert!((azimuths.horizontal - 90.0).abs() < 1e-12);
        assert!((azimuths.vertical_two + 45.0).abs() < 1e-12);
    }

    #[test]
    fn estimator_smooths_each_axis_independently() {
        let mut estimator = AzimuthEstimator::with_capacity(10);
        assert!(estimator.smoothed().is_none());
        for (h, v) in [(10.0, -5.0), (12.0, -50.0), (11.0, -6.0)] {
            estimator.push(Azimuths {
                horizontal: h,
                vertical_one: v,
                vertical_two: v,
            });
        }
        let smoothed = estimator.smoothed().unwrap();
        assert_eq!(smoothed.horizontal, 11.0);
        assert_eq!(smoothed.vertical_one, -6.0);
        assert_eq!(estimator.len(), 3);
    }
}
