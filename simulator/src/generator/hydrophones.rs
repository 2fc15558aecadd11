use crate::generator::scenario::ScenarioConfig;
use anyhow::Context;
use pingercore::interface::{Acquisition, GainControl, GainDirection, PeriodTimer};
use pingercore::prelude::{Channel, ChannelSet, Frame, PipelineResult};
use pingercore::processing::geolocation::SensorArray;
use pingercore::{DerivedParameters, PingerConfig};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

pub struct SimulatedHydrophones {
    scenario: ScenarioConfig,
    carrier: f64,
    pulse_length: f64,
    attack: f64,
    sample_period: f64,
    frame_size: usize,
    /// One-way travel time to each sensor [s].
    travel: [f64; 4],
    /// Received amplitude per sensor after spherical spreading.
    amplitude: [f64; 4],
    period_start: f64,
    gain: f64,
    rng: StdRng,
    realtime: bool,
    last_tick: Option<Instant>,
}

impl SimulatedHydrophones {
    pub fn new(pinger: &PingerConfig, scenario: &ScenarioConfig) -> anyhow::Result<Self> {
        scenario.validate()?;
        let params =
            DerivedParameters::from_config(pinger).context("deriving pinger parameters")?;
        let array = SensorArray::square(params.half_spacing);
        let source = scenario.pinger_position();

        let ranges = Channel::ALL.map(|channel| {
            let sensor = array.position(channel);
            source
                .iter()
                .zip(sensor.iter())
                .map(|(p, s)| (p - s) * (p - s))
                .sum::<f64>()
                .sqrt()
        });
        anyhow::ensure!(
            ranges.iter().all(|&range| range > params.half_spacing),
            "pinger is inside the sensor array"
        );

        Ok(Self {
            scenario: scenario.clone(),
            carrier: pinger.pinger_frequency,
            pulse_length: pinger.pulse_length,
            attack: scenario.attack_cycles / pinger.pinger_frequency,
            sample_period: params.sample_period,
            frame_size: params.frame_size,
            travel: ranges.map(|range| range / pinger.sound_speed),
            amplitude: ranges.map(|range| scenario.source_level / range.max(1.0)),
            period_start: 0.0,
            gain: scenario.initial_gain,
            rng: StdRng::seed_from_u64(scenario.seed),
            realtime: false,
            last_tick: None,
        })
    }

    /// Makes `wait_until_next_period` sleep for the PRT in wall-clock time.
    pub fn realtime(mut self, enabled: bool) -> Self {
        self.realtime = enabled;
        self
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn clock(&self) -> f64 {
        self.period_start
    }

    /// True arrival time of the pulse on `channel` that follows `after`.
    pub fn next_arrival(&self, channel: Channel, after: f64) -> f64 {
        let first = self.scenario.emission_offset + self.travel[channel.index()];
        let periods = ((after - first) / self.scenario.prt).ceil().max(0.0);
        first + periods * self.scenario.prt
    }

    fn pulse_value(&self, channel: Channel, time: f64) -> f64 {
        let since_first = time - self.scenario.emission_offset - self.travel[channel.index()];
        if since_first < 0.0 {
            return 0.0;
        }
        let tau = since_first.rem_euclid(self.scenario.prt);
        if tau > self.pulse_length {
            return 0.0;
        }
        let ramp = if self.attack > 0.0 {
            (tau / self.attack).min(1.0)
        } else {
            1.0
        };
        self.amplitude[channel.index()] * ramp * (2.0 * PI * self.carrier * tau).sin()
    }

    fn synthesize(&mut self, channel: Channel, start_time: f64) -> Frame {
        let noise = self.scenario.noise;
        let mut samples = Vec::with_capacity(self.frame_size);
        for i in 0..self.frame_size {
            let time = start_time + i as f64 * self.sample_period;
            let signal = self.pulse_value(channel, time);
            let jitter = if noise > 0.0 {
                self.rng.gen_range(-noise..noise)
            } else {
                0.0
            };
            samples.push((self.gain * (signal + jitter)).clamp(-1.0, 1.0));
        }
        Frame::new(start_time, samples)
    }
}

impl Acquisition for SimulatedHydrophones {
    fn sample_channel(&mut self, channel: Channel, trigger_delay: f64) -> PipelineResult<Frame> {
        let start_time = self.period_start + trigger_delay;
        Ok(self.synthesize(channel, start_time))
    }

    fn sample_all_channels(&mut self, trigger_delay: f64) -> PipelineResult<ChannelSet<Frame>> {
        let start_time = self.period_start + trigger_delay;
        Ok(ChannelSet::new(
            Channel::ALL.map(|channel| self.synthesize(channel, start_time)),
        ))
    }
}

impl GainControl for SimulatedHydrophones {
    fn adjust_gain(&mut self, direction: GainDirection) {
        let gain = match direction {
            GainDirection::Increase => self.gain * self.scenario.gain_step,
            GainDirection::Decrease => self.gain / self.scenario.gain_step,
        };
        self.gain = gain.clamp(self.scenario.min_gain, self.scenario.max_gain);
        log::debug!("PGA gain now {:.3}", self.gain);
    }
}

impl PeriodTimer for SimulatedHydrophones {
    fn wait_until_next_period(&mut self, prt: f64) {
        self.period_start += prt;
        if !self.realtime {
            return;
        }
        let period = Duration::from_secs_f64(prt.max(0.0));
        let now = Instant::now();
        let deadline = self.last_tick.map_or(now + period, |tick| tick + period);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.last_tick = Some(deadline.max(now));
    }
}
