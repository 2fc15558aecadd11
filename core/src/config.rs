use crate::prelude::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// Configuration shared by every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingerConfig {
    /// Pinger carrier frequency [Hz].
    pub pinger_frequency: f64,
    /// Speed of sound in water [m/s].
    pub sound_speed: f64,
    /// Emitted pulse duration [s].
    pub pulse_length: f64,
    /// ADC sampling frequency [Hz].
    pub adc_frequency: f64,
    /// Samples per frame (N0).
    pub frame_size: usize,
    /// Bandpass center frequency [Hz].
    pub filter_center: f64,
    /// Bandpass half width [Hz].
    pub filter_half_width: f64,
    /// Break-wall threshold as a fraction of the envelope peak.
    pub threshold: f64,
    /// Minimum envelope peak for a frame to count as containing a pulse.
    pub detection_floor: f64,
    /// Depth of each azimuth median history.
    pub history_size: usize,
    /// Passband power regulation window.
    pub power_min: f64,
    pub power_max: f64,
    /// PRT assumed before the first lock [s].
    pub initial_prt: f64,
    /// Consecutive centered detections needed to declare lock.
    pub lock_detections: usize,
    /// Allowed spread of measured pulse intervals around their mean [s].
    pub prt_tolerance: f64,
    /// Allowed head offset from frame center, in samples.
    pub center_tolerance: usize,
    /// Crossings before this index mean the head preceded the frame.
    pub head_guard: usize,
    /// Fraction of a frame re-covered by consecutive scan steps.
    pub scan_overlap: f64,
    /// Break-wall/correlation agreement window, in wavelengths.
    pub agree_tolerance: f64,
    /// Disagreement beyond this many wavelengths forces a resync.
    pub resync_tolerance: f64,
    /// Range slack used by the sphere-consistency test, in samples.
    pub range_tolerance_samples: f64,
    /// Overrides the physically derived correlation lag bound.
    pub max_lag: Option<usize>,
    /// Overrides the derived number of correlation peak candidates.
    pub max_peaks: Option<usize>,
}

impl Default for PingerConfig {
    fn default() -> Self {
        Self {
            pinger_frequency: 37.0e3,
            sound_speed: 1482.0,
            pulse_length: 4.0e-3,
            adc_frequency: 1800.0e3,
            frame_size: 1024,
            filter_center: 37.0e3,
            filter_half_width: 5.0e3,
            threshold: 0.9,
            detection_floor: 0.05,
            history_size: 10,
            power_min: 0.005,
            power_max: 0.4,
            initial_prt: 2.0,
            lock_detections: 3,
            prt_tolerance: 20.0e-6,
            center_tolerance: 128,
            head_guard: 64,
            scan_overlap: 0.25,
            agree_tolerance: 0.25,
            resync_tolerance: 0.75,
            range_tolerance_samples: 2.0,
            max_lag: None,
            max_peaks: None,
        }
    }
}

/// Validated constants derived from a [`PingerConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedParameters {
    /// Acoustic wavelength [m].
    pub wavelength: f64,
    /// Adjacent sensor spacing D [m]; equal to one wavelength.
    pub sensor_spacing: f64,
    /// Sensor distance from the array center d = D/√2 [m].
    pub half_spacing: f64,
    /// ADC sampling period tADC [s].
    pub sample_period: f64,
    /// Spectral resolution f0 [Hz].
    pub frequency_resolution: f64,
    pub samples_per_wavelength: f64,
    /// Duration of one frame [s].
    pub frame_span: f64,
    pub frame_size: usize,
    /// Correlation lag bound (iBound), in samples.
    pub lag_bound: usize,
    /// Maximum correlation peak candidates (peakCounterMax).
    pub max_peaks: usize,
}

impl DerivedParameters {
    pub fn from_config(config: &PingerConfig) -> PipelineResult<Self> {
        validate(config)?;

        let wavelength = config.sound_speed / config.pinger_frequency;
        let sensor_spacing = wavelength;
        let half_spacing = sensor_spacing / std::f64::consts::SQRT_2;
        let sample_period = 1.0 / config.adc_frequency;
        let samples_per_wavelength = config.adc_frequency / config.pinger_frequency;

        // Opposite sensors are 2d apart; keep one sample of slack on each side.
        let max_delay_samples = 2.0 * half_spacing / (config.sound_speed * sample_period);
        let lag_bound = config
            .max_lag
            .unwrap_or(max_delay_samples.floor() as usize + 2);
        let max_peaks = config
            .max_peaks
            .unwrap_or((2.0 * lag_bound as f64 / samples_per_wavelength).floor() as usize + 1);

        if lag_bound == 0 || lag_bound >= config.frame_size / 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "correlation lag bound {} does not fit a {}-sample frame",
                lag_bound, config.frame_size
            )));
        }
        if max_peaks == 0 {
            return Err(PipelineError::InvalidConfig(
                "at least one correlation peak candidate is required".into(),
            ));
        }

        Ok(Self {
            wavelength,
            sensor_spacing,
            half_spacing,
            sample_period,
            frequency_resolution: config.adc_frequency / config.frame_size as f64,
            samples_per_wavelength,
            frame_span: config.frame_size as f64 * sample_period,
            frame_size: config.frame_size,
            lag_bound,
            max_peaks,
        })
    }

    /// Frame index the synchronization loop steers the pulse head toward.
    pub fn center_index(&self) -> f64 {
        (self.frame_size / 2) as f64
    }
}

fn validate(config: &PingerConfig) -> PipelineResult<()> {
    let positive = [
        ("pinger_frequency", config.pinger_frequency),
        ("sound_speed", config.sound_speed),
        ("pulse_length", config.pulse_length),
        ("adc_frequency", config.adc_frequency),
        ("filter_center", config.filter_center),
        ("filter_half_width", config.filter_half_width),
        ("detection_floor", config.detection_floor),
        ("initial_prt", config.initial_prt),
        ("prt_tolerance", config.prt_tolerance),
        ("agree_tolerance", config.agree_tolerance),
        ("range_tolerance_samples", config.range_tolerance_samples),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
    }

    if config.frame_size < 16 || config.frame_size % 2 != 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "frame_size must be even and at least 16, got {}",
            config.frame_size
        )));
    }
    if config.filter_center + config.filter_half_width >= config.adc_frequency / 2.0 {
        return Err(PipelineError::InvalidConfig(
            "passband extends beyond the Nyquist frequency".into(),
        ));
    }
    if !(config.threshold > 0.0 && config.threshold < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "threshold must lie in (0, 1), got {}",
            config.threshold
        )));
    }
    if config.history_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "history_size must be at least 1".into(),
        ));
    }
    if !(config.power_min >= 0.0 && config.power_min < config.power_max) {
        return Err(PipelineError::InvalidConfig(format!(
            "power window [{}, {}] is empty",
            config.power_min, config.power_max
        )));
    }
    if config.lock_detections < 2 {
        return Err(PipelineError::InvalidConfig(
            "lock_detections must be at least 2 to measure a period".into(),
        ));
    }
    if !(0.0..1.0).contains(&config.scan_overlap) {
        return Err(PipelineError::InvalidConfig(format!(
            "scan_overlap must lie in [0, 1), got {}",
            config.scan_overlap
        )));
    }
    if config.resync_tolerance < config.agree_tolerance {
        return Err(PipelineError::InvalidConfig(
            "resync_tolerance must not be tighter than agree_tolerance".into(),
        ));
    }
    if config.center_tolerance >= config.frame_size / 2 || config.head_guard >= config.frame_size / 2
    {
        return Err(PipelineError::InvalidConfig(
            "center_tolerance and head_guard must stay within half a frame".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_matches_wavelength() {
        let params = DerivedParameters::from_config(&PingerConfig::default()).unwrap();
        assert!((params.wavelength - 1482.0 / 37.0e3).abs() < 1e-12);
        assert!((params.half_spacing * std::f64::consts::SQRT_2 - params.sensor_spacing).abs() < 1e-12);
        assert_eq!(params.lag_bound, 70);
        assert_eq!(params.max_peaks, 3);
    }

    #[test]
    fn overrides_replace_derived_correlation_limits() {
        let config = PingerConfig {
            max_lag: Some(40),
            max_peaks: Some(5),
            ..Default::default()
        };
        let params = DerivedParameters::from_config(&config).unwrap();
        assert_eq!(params.lag_bound, 40);
        assert_eq!(params.max_peaks, 5);
    }

    #[test]
    fn passband_above_nyquist_is_rejected() {
        let config = PingerConfig {
            filter_center: 899.0e3,
            ..Default::default()
        };
        assert!(matches!(
            DerivedParameters::from_config(&config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn odd_frame_size_is_rejected() {
        let config = PingerConfig {
            frame_size: 1023,
            ..Default::default()
        };
        assert!(DerivedParameters::from_config(&config).is_err());
    }

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let config: PingerConfig =
            serde_json::from_str(r#"{ "pinger_frequency": 30000.0 }"#).unwrap();
        assert_eq!(config.pinger_frequency, 30000.0);
        assert_eq!(config.frame_size, 1024);
    }
}
