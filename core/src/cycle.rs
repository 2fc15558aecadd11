use crate::config::{DerivedParameters, PingerConfig};
use crate::interface::{Acquisition, AzimuthReport, GainControl, GainDirection, PeriodTimer};
use crate::math::stats::StatsHelper;
use crate::prelude::{Channel, ChannelSet, PipelineError, PipelineResult};
use crate::processing::azimuth::{AzimuthEstimator, Azimuths};
use crate::processing::geolocation::{GeolocationSolver, GeometryError};
use crate::processing::spectral::{FilteredFrame, SpectralEngine};
use crate::processing::sync::{HeadObservation, SyncController, SyncState, SyncStatus};
use crate::processing::toa::{ToaExtractor, ToaFault};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};

/// Why a locked cycle produced no report.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CycleFault {
    #[error("sync lost: {0}")]
    SyncLoss(#[from] ToaFault),
    #[error("degenerate geometry: {0}")]
    Degenerate(GeometryError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Searching(SyncStatus),
    Emitted(AzimuthReport),
    Dropped(CycleFault),
}

pub struct CycleOrchestrator<H> {
    config: PingerConfig,
    params: DerivedParameters,
    hardware: H,
    spectral: SpectralEngine,
    sync: SyncController,
    toa: ToaExtractor,
    solver: GeolocationSolver,
    azimuth: AzimuthEstimator,
    metrics: MetricsRecorder,
    logger: LogManager,
    cycle: u64,
}

impl<H> CycleOrchestrator<H>
where
    H: Acquisition + GainControl + PeriodTimer,
{
    pub fn new(config: PingerConfig, hardware: H) -> PipelineResult<Self> {
        let params = DerivedParameters::from_config(&config)?;
        let logger = LogManager::new("cycle");
        logger.record(&format!(
            "pinger {:.0} Hz, d = {:.4} m, lag bound ±{}, {} peak candidates",
            config.pinger_frequency, params.half_spacing, params.lag_bound, params.max_peaks
        ));
        Ok(Self {
            spectral: SpectralEngine::new(&config, &params),
            sync: SyncController::new(&config, &params),
            toa: ToaExtractor::new(&config, &params),
            solver: GeolocationSolver::new(&config, &params),
            azimuth: AzimuthEstimator::new(&config),
            metrics: MetricsRecorder::new(),
            logger,
            cycle: 0,
            config,
            params,
            hardware,
        })
    }

    /// Skips the search phase with a known PRT and trigger delay.
    pub fn with_lock(mut self, prt: f64, trigger_delay: f64) -> Self {
        self.sync = SyncController::new(&self.config, &self.params).with_lock(prt, trigger_delay);
        self
    }

    pub fn config(&self) -> &PingerConfig {
        &self.config
    }

    pub fn params(&self) -> &DerivedParameters {
        &self.params
    }

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    pub fn azimuth(&self) -> &AzimuthEstimator {
        &self.azimuth
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn into_hardware(self) -> H {
        self.hardware
    }

    /// Runs one cycle and waits for the next period. Numerical faults are
    /// logged and the cycle is skipped; other errors propagate.
    pub fn step(&mut self) -> PipelineResult<Option<CycleOutcome>> {
        let outcome = match self.run_cycle() {
            Ok(outcome) => Some(outcome),
            Err(err @ PipelineError::Numerical { .. }) => {
                self.logger
                    .warn(&format!("cycle {} skipped: {}", self.cycle, err));
                None
            }
            Err(err) => return Err(err),
        };
        self.hardware.wait_until_next_period(self.sync.prt());
        Ok(outcome)
    }

    pub fn run_cycle(&mut self) -> PipelineResult<CycleOutcome> {
        self.cycle += 1;
        let result = match self.sync.state() {
            SyncState::Searching => self.search_cycle(),
            SyncState::Locked => self.locked_cycle(),
        };
        if let Err(PipelineError::Numerical { .. }) = result {
            self.metrics.record_numerical_fault();
        }
        result
    }

    fn search_cycle(&mut self) -> PipelineResult<CycleOutcome> {
        self.metrics.record_search();
        let frame = self
            .hardware
            .sample_channel(Channel::One, self.sync.trigger_delay())?;
        let filtered = self.spectral.filter(&frame)?;
        let status = self.sync.step(&filtered);

        if status.observation != HeadObservation::Empty {
            self.regulate_gain(filtered.passband_power);
        }
        if status.state == SyncState::Locked {
            self.logger
                .record(&format!("cycle {}: locked at PRT {:.6} s", self.cycle, status.prt));
        }
        Ok(CycleOutcome::Searching(status))
    }

    fn locked_cycle(&mut self) -> PipelineResult<CycleOutcome> {
        self.metrics.record_locked();
        let frames = self
            .hardware
            .sample_all_channels(self.sync.trigger_delay())?;
        frames.validate(self.params.frame_size)?;
        let timestamp = frames.get(Channel::One).start_time;

        let filtered = frames
            .iter()
            .map(|(_, frame)| self.spectral.filter(frame))
            .collect::<PipelineResult<Vec<FilteredFrame>>>()?;
        let filtered = ChannelSet::from_vec(filtered)?;

        let powers: Vec<f64> = filtered.iter().map(|(_, frame)| frame.passband_power).collect();
        if let Some(power) = StatsHelper::mean(&powers) {
            self.regulate_gain(power);
        }

        let toa = match self.toa.extract(&filtered) {
            Ok(toa) => toa,
            Err(fault) => {
                self.sync.force_resync(&fault.to_string());
                self.metrics.record_resync();
                return Ok(CycleOutcome::Dropped(fault.into()));
            }
        };
        self.sync.track(toa.head_index() as f64);

        let position = match self.solver.locate(toa.primary_toa, toa.delay_seconds()) {
            Ok(position) => position,
            Err(GeometryError::NonFinite(what)) => {
                return Err(PipelineError::Numerical {
                    stage: "geolocation",
                    detail: format!("non-finite {}", what),
                })
            }
            Err(err) => {
                self.logger
                    .warn(&format!("cycle {} discarded: {}", self.cycle, err));
                self.metrics.record_degenerate();
                return Ok(CycleOutcome::Dropped(CycleFault::Degenerate(err)));
            }
        };

        let raw = Azimuths::from_position(&position);
        let smoothed = self.azimuth.push(raw);
        self.metrics.record_emitted();
        self.logger.debug(&format!(
            "cycle {}: horizontal {:.2}° (smoothed {:.2}°)",
            self.cycle, raw.horizontal, smoothed.horizontal
        ));

        Ok(CycleOutcome::Emitted(AzimuthReport {
            cycle: self.cycle,
            timestamp,
            raw,
            smoothed,
            position,
            prt: self.sync.prt(),
        }))
    }

    fn regulate_gain(&mut self, power: f64) {
        let direction = if power < self.config.power_min {
            GainDirection::Increase
        } else if power > self.config.power_max {
            GainDirection::Decrease
        } else {
            return;
        };
        self.logger
            .debug(&format!("passband power {:.4} out of window, {:?}", power, direction));
        self.hardware.adjust_gain(direction);
        self.metrics.record_gain_adjustment();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::Frame;
    use crate::processing::geolocation::SensorArray;
    use crate::testing;

    struct ScriptedHardware {
        frames: ChannelSet<Frame>,
        gain: Vec<GainDirection>,
        waits: Vec<f64>,
        offline: bool,
    }

    impl ScriptedHardware {
        fn new(frames: ChannelSet<Frame>) -> Self {
            Self {
                frames,
                gain: Vec::new(),
                waits: Vec::new(),
                offline: false,
            }
        }

        fn check_online(&self) -> PipelineResult<()> {
            if self.offline {
                return Err(PipelineError::Acquisition("ADC not responding".into()));
            }
            Ok(())
        }
    }

    impl Acquisition for ScriptedHardware {
        fn sample_channel(&mut self, channel: Channel, _trigger_delay: f64) -> PipelineResult<Frame> {
            self.check_online()?;
            Ok(self.frames.get(channel).clone())
        }

        fn sample_all_channels(&mut self, _trigger_delay: f64) -> PipelineResult<ChannelSet<Frame>> {
            self.check_online()?;
            Ok(self.frames.clone())
        }
    }

    impl GainControl for ScriptedHardware {
        fn adjust_gain(&mut self, direction: GainDirection) {
            self.gain.push(direction);
        }
    }

    impl PeriodTimer for ScriptedHardware {
        fn wait_until_next_period(&mut self, prt: f64) {
            self.waits.push(prt);
        }
    }

    fn onsets_for(pinger: [f64; 3], config: &PingerConfig, params: &DerivedParameters) -> [f64; 4] {
        let array = SensorArray::square(params.half_spacing);
        let ranges = Channel::ALL.map(|channel| {
            let sensor = array.position(channel);
            let dx = pinger[0] - sensor[0];
            let dy = pinger[1] - sensor[1];
            let dz = pinger[2] - sensor[2];
            (dx * dx + dy * dy + dz * dz).sqrt()
        });
        ranges.map(|range| 330.0 + (range - ranges[0]) / (config.sound_speed * params.sample_period))
    }

    fn locked(config: PingerConfig, frames: ChannelSet<Frame>) -> CycleOrchestrator<ScriptedHardware> {
        CycleOrchestrator::new(config, ScriptedHardware::new(frames))
            .unwrap()
            .with_lock(2.0, 0.0)
    }

    #[test]
    fn pinger_on_sensor_one_axis_reports_zero_azimuth() {
        let (config, params) = testing::burst_setup();
        let onsets = onsets_for([0.0, 20.0, -10.0], &config, &params);
        let frames = testing::channel_frames(&config, &params, 4.0, onsets, 0.5);
        let mut orchestrator = locked(config, frames);

        let report = match orchestrator.run_cycle().unwrap() {
            CycleOutcome::Emitted(report) => report,
            other => panic!("expected a report, got {:?}", other),
        };

        assert_eq!(report.cycle, 1);
        assert_eq!(report.timestamp, 4.0);
        assert_eq!(report.prt, 2.0);
        assert!(report.raw.horizontal.abs() < 1.0, "{:?}", report.raw);
        assert!(report.position.z < 0.0);
        let expected_vertical = (-10.0f64).atan2(20.0).to_degrees();
        assert!((report.raw.vertical_one - expected_vertical).abs() < 5.0, "{:?}", report.raw);
        assert_eq!(report.smoothed, report.raw);

        assert_eq!(orchestrator.azimuth().len(), 1);
        assert!(orchestrator.hardware().gain.is_empty());
        assert_eq!(orchestrator.metrics().emitted, 1);
    }

    #[test]
    fn degenerate_delays_are_dropped_without_history_push() {
        let (config, params) = testing::burst_setup();
        // Opposite sensors hear the pulse together, adjacent ones a wavelength apart.
        let onsets = [330.0, 378.0, 330.0, 378.0];
        let frames = testing::channel_frames(&config, &params, 0.0, onsets, 0.5);
        let mut orchestrator = locked(config, frames);

        let outcome = orchestrator.run_cycle().unwrap();
        assert!(
            matches!(outcome, CycleOutcome::Dropped(CycleFault::Degenerate(_))),
            "{:?}",
            outcome
        );
        assert!(orchestrator.azimuth().is_empty());
        assert!(orchestrator.sync().is_locked());
        assert_eq!(orchestrator.metrics().degenerate, 1);
    }

    #[test]
    fn estimator_disagreement_forces_resync() {
        let (config, params) = testing::burst_setup();
        let mut frames = testing::channel_frames(&config, &params, 0.0, [330.0; 4], 0.5).into_inner();
        let echo = testing::pulse_samples(&config, &params, 30.0, 2.0);
        for (sample, extra) in frames[1].samples.iter_mut().zip(echo) {
            *sample += extra;
        }
        let mut orchestrator = locked(config, ChannelSet::new(frames));

        let outcome = orchestrator.run_cycle().unwrap();
        assert!(
            matches!(outcome, CycleOutcome::Dropped(CycleFault::SyncLoss(_))),
            "{:?}",
            outcome
        );
        assert_eq!(orchestrator.sync().state(), SyncState::Searching);
        assert!(orchestrator.azimuth().is_empty());
        assert_eq!(orchestrator.metrics().resyncs, 1);
    }

    #[test]
    fn weak_signal_raises_gain() {
        let (config, params) = testing::burst_setup();
        let frames = testing::channel_frames(&config, &params, 0.0, [330.0; 4], 0.08);
        let mut orchestrator = locked(config, frames);

        orchestrator.run_cycle().unwrap();
        assert_eq!(orchestrator.hardware().gain, vec![GainDirection::Increase]);
        assert_eq!(orchestrator.metrics().gain_adjustments, 1);
    }

    #[test]
    fn strong_signal_lowers_gain() {
        let (config, params) = testing::burst_setup();
        let frames = testing::channel_frames(&config, &params, 0.0, [330.0; 4], 2.0);
        let mut orchestrator = locked(config, frames);

        let outcome = orchestrator.run_cycle().unwrap();
        assert!(matches!(outcome, CycleOutcome::Emitted(_)), "{:?}", outcome);
        assert_eq!(orchestrator.hardware().gain, vec![GainDirection::Decrease]);
        assert_eq!(orchestrator.metrics().gain_adjustments, 1);
    }

    #[test]
    fn weak_pulse_while_searching_raises_gain() {
        let (config, params) = testing::default_setup();
        let silent = Frame::new(0.0, vec![0.0; params.frame_size]);
        let weak = testing::pulse_frame(&config, &params, 0.0, 400.0, 0.08);
        let frames = ChannelSet::new([weak, silent.clone(), silent.clone(), silent]);
        let mut orchestrator =
            CycleOrchestrator::new(config, ScriptedHardware::new(frames)).unwrap();

        let status = match orchestrator.run_cycle().unwrap() {
            CycleOutcome::Searching(status) => status,
            other => panic!("expected a search status, got {:?}", other),
        };
        assert!(
            matches!(status.observation, HeadObservation::Head(_)),
            "{:?}",
            status.observation
        );
        assert_eq!(orchestrator.hardware().gain, vec![GainDirection::Increase]);
        assert_eq!(orchestrator.metrics().gain_adjustments, 1);
    }

    #[test]
    fn acquisition_failure_propagates_from_step() {
        let (config, params) = testing::burst_setup();
        let frames = testing::channel_frames(&config, &params, 0.0, [330.0; 4], 0.5);
        let mut hardware = ScriptedHardware::new(frames);
        hardware.offline = true;
        let mut orchestrator = CycleOrchestrator::new(config, hardware).unwrap();

        assert!(matches!(
            orchestrator.step(),
            Err(PipelineError::Acquisition(_))
        ));
        assert!(orchestrator.hardware().waits.is_empty());
        assert_eq!(orchestrator.metrics().numerical_faults, 0);
    }

    #[test]
    fn search_cycle_samples_only_channel_one() {
        let (config, params) = testing::default_setup();
        let silent = Frame::new(0.0, vec![0.0; params.frame_size]);
        let frames = ChannelSet::new([silent.clone(), silent.clone(), silent.clone(), silent]);
        let mut orchestrator =
            CycleOrchestrator::new(config, ScriptedHardware::new(frames)).unwrap();

        let status = match orchestrator.step().unwrap() {
            Some(CycleOutcome::Searching(status)) => status,
            other => panic!("expected a search status, got {:?}", other),
        };
        assert_eq!(status.observation, HeadObservation::Empty);
        assert!(orchestrator.hardware().gain.is_empty());
        assert_eq!(orchestrator.hardware().waits, vec![2.0]);
        assert_eq!(orchestrator.metrics().search_cycles, 1);
    }

    #[test]
    fn numerical_fault_is_skipped_by_step() {
        let (config, params) = testing::burst_setup();
        let mut frames = testing::channel_frames(&config, &params, 0.0, [330.0; 4], 0.5).into_inner();
        frames[2].samples[100] = f64::NAN;
        let mut orchestrator = locked(config, ChannelSet::new(frames));

        assert!(matches!(
            orchestrator.run_cycle(),
            Err(PipelineError::Numerical { .. })
        ));
        assert_eq!(orchestrator.step().unwrap(), None);
        assert_eq!(orchestrator.hardware().waits.len(), 1);
        assert_eq!(orchestrator.metrics().numerical_faults, 2);
        assert!(orchestrator.azimuth().is_empty());
    }

    #[test]
    fn misaligned_frames_are_invalid_input() {
        let (config, params) = testing::burst_setup();
        let mut frames = testing::channel_frames(&config, &params, 0.0, [330.0; 4], 0.5).into_inner();
        frames[3].start_time = 0.001;
        let mut orchestrator = locked(config, ChannelSet::new(frames));

        assert!(matches!(
            orchestrator.step(),
            Err(PipelineError::InvalidInput(_))
        ));
    }
}
