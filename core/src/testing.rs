use crate::config::{DerivedParameters, PingerConfig};
use crate::prelude::{ChannelSet, Frame};
use crate::processing::spectral::{FilteredFrame, SpectralEngine};
use std::f64::consts::PI;

pub(crate) const ATTACK_CYCLES: f64 = 3.0;

pub(crate) fn default_setup() -> (PingerConfig, DerivedParameters) {
    let config = PingerConfig::default();
    let params = DerivedParameters::from_config(&config).expect("default config is valid");
    (config, params)
}

/// Default setup with a 250 µs pulse, so whole bursts fit inside one frame.
pub(crate) fn burst_setup() -> (PingerConfig, DerivedParameters) {
    let config = PingerConfig {
        pulse_length: 0.25e-3,
        ..PingerConfig::default()
    };
    let params = DerivedParameters::from_config(&config).expect("burst config is valid");
    (config, params)
}

/// Attack-ramped carrier whose head arrives at fractional sample `onset`.
pub(crate) fn pulse_samples(
    config: &PingerConfig,
    params: &DerivedParameters,
    onset: f64,
    amplitude: f64,
) -> Vec<f64> {
    let attack = ATTACK_CYCLES / config.pinger_frequency;
    (0..params.frame_size)
        .map(|i| {
            let tau = (i as f64 - onset) * params.sample_period;
            if tau < 0.0 || tau > config.pulse_length {
                0.0
            } else {
                amplitude * (tau / attack).min(1.0) * (2.0 * PI * config.pinger_frequency * tau).sin()
            }
        })
        .collect()
}

pub(crate) fn pulse_frame(
    config: &PingerConfig,
    params: &DerivedParameters,
    start_time: f64,
    onset: f64,
    amplitude: f64,
) -> Frame {
    Frame::new(start_time, pulse_samples(config, params, onset, amplitude))
}

/// Raw frames for four channels whose heads arrive at the given onsets.
pub(crate) fn channel_frames(
    config: &PingerConfig,
    params: &DerivedParameters,
    start_time: f64,
    onsets: [f64; 4],
    amplitude: f64,
) -> ChannelSet<Frame> {
    ChannelSet::new(onsets.map(|onset| pulse_frame(config, params, start_time, onset, amplitude)))
}

pub(crate) fn filtered_channels(
    config: &PingerConfig,
    params: &DerivedParameters,
    onsets: [f64; 4],
    amplitude: f64,
) -> ChannelSet<FilteredFrame> {
    let mut engine = SpectralEngine::new(config, params);
    channel_frames(config, params, 0.0, onsets, amplitude)
        .map(|frame| engine.filter(&frame).expect("synthetic frame filters"))
}
