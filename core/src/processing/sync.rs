use crate::config::{DerivedParameters, PingerConfig};
use crate::math::stats::StatsHelper;
use crate::processing::spectral::FilteredFrame;
use crate::processing::toa::break_wall_index;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Searching,
    Locked,
}

/// Where the pulse sits relative to one channel-1 frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadObservation {
    /// No pulse energy above the detection floor.
    Empty,
    /// Pulse present from the first samples; its head precedes the frame.
    BodyOnly,
    /// Head crossing found at this sample index.
    Head(usize),
}

/// Result of one synchronization step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub prt: f64,
    pub trigger_delay: f64,
    pub observation: HeadObservation,
}

pub struct SyncController {
    state: SyncState,
    prt: f64,
    trigger_delay: f64,
    arrivals: VecDeque<f64>,
    threshold: f64,
    detection_floor: f64,
    sample_period: f64,
    center: f64,
    center_tolerance: f64,
    head_guard: usize,
    scan_step: f64,
    pulse_length: f64,
    lock_detections: usize,
    prt_tolerance: f64,
    logger: LogManager,
}

impl SyncController {
    pub fn new(config: &PingerConfig, params: &DerivedParameters) -> Self {
        Self {
            state: SyncState::Searching,
            prt: config.initial_prt,
            trigger_delay: 0.0,
            arrivals: VecDeque::with_capacity(config.lock_detections),
            threshold: config.threshold,
            detection_floor: config.detection_floor,
            sample_period: params.sample_period,
            center: params.center_index(),
            center_tolerance: config.center_tolerance as f64,
            head_guard: config.head_guard,
            scan_step: params.frame_span * (1.0 - config.scan_overlap),
            pulse_length: config.pulse_length,
            lock_detections: config.lock_detections,
            prt_tolerance: config.prt_tolerance,
            logger: LogManager::new("sync"),
        }
    }

    /// Starts already locked, e.g. when resuming with a known PRT and delay.
    pub fn with_lock(mut self, prt: f64, trigger_delay: f64) -> Self {
        self.state = SyncState::Locked;
        self.prt = prt;
        self.trigger_delay = trigger_delay.rem_euclid(prt);
        self.arrivals.clear();
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == SyncState::Locked
    }

    pub fn prt(&self) -> f64 {
        self.prt
    }

    pub fn trigger_delay(&self) -> f64 {
        self.trigger_delay
    }

    /// Classifies a filtered channel-1 frame by its envelope.
    pub fn observe(&self, frame: &FilteredFrame) -> HeadObservation {
        match break_wall_index(&frame.envelope.samples, self.threshold, self.detection_floor) {
            None => HeadObservation::Empty,
            Some(index) if index < self.head_guard => HeadObservation::BodyOnly,
            Some(index) => HeadObservation::Head(index),
        }
    }

    /// Advances the search by one channel-1 frame.
    pub fn step(&mut self, frame: &FilteredFrame) -> SyncStatus {
        let observation = self.observe(frame);
        match observation {
            HeadObservation::Empty => {
                self.arrivals.clear();
                self.shift_delay(self.scan_step);
            }
            HeadObservation::BodyOnly => {
                self.arrivals.clear();
                self.shift_delay(-self.pulse_length);
                self.logger.debug("inside pulse body, stepping back one pulse length");
            }
            HeadObservation::Head(index) => {
                let offset = index as f64 - self.center;
                let arrival = frame.waveform.start_time + index as f64 * self.sample_period;
                self.shift_delay(offset * self.sample_period);

                if offset.abs() <= self.center_tolerance {
                    self.record_arrival(arrival);
                } else {
                    self.arrivals.clear();
                    self.logger
                        .debug(&format!("head at sample {}, recentering", index));
                }
            }
        }
        self.status(observation)
    }

    /// Keeps a locked pulse centered using the channel-1 head index.
    pub fn track(&mut self, head_index: f64) {
        if self.state != SyncState::Locked {
            return;
        }
        let offset = head_index - self.center;
        if offset.abs() > self.center_tolerance {
            self.logger
                .warn(&format!("locked head drifted {:.1} samples off center", offset));
        }
        self.shift_delay(offset * self.sample_period);
    }

    /// Drops lock; the next cycle searches again from the current delay.
    pub fn force_resync(&mut self, reason: &str) {
        if self.state == SyncState::Locked {
            self.logger.warn(&format!("lost sync: {}", reason));
        }
        self.state = SyncState::Searching;
        self.arrivals.clear();
    }

    fn status(&self, observation: HeadObservation) -> SyncStatus {
        SyncStatus {
            state: self.state,
            prt: self.prt,
            trigger_delay: self.trigger_delay,
            observation,
        }
    }

    fn shift_delay(&mut self, amount: f64) {
        self.trigger_delay = (self.trigger_delay + amount).rem_euclid(self.prt);
    }

    fn record_arrival(&mut self, arrival: f64) {
        self.arrivals.push_back(arrival);
        while self.arrivals.len() > self.lock_detections {
            self.arrivals.pop_front();
        }
        if self.arrivals.len() < self.lock_detections {
            return;
        }

        if let Some(period) = self.stable_period() {
            self.prt = period;
            self.trigger_delay = self.trigger_delay.rem_euclid(period);
            self.state = SyncState::Locked;
            self.logger.record(&format!(
                "locked: PRT {:.6} s, trigger delay {:.6} s",
                period, self.trigger_delay
            ));
        }
    }

    fn stable_period(&self) -> Option<f64> {
        let intervals: Vec<f64> = self
            .arrivals
            .iter()
            .zip(self.arrivals.iter().skip(1))
            .map(|(earlier, later)| later - earlier)
            .collect();
        if intervals.iter().any(|&interval| interval <= 0.0) {
            return None;
        }
        let mean = StatsHelper::mean(&intervals)?;
        intervals
            .iter()
            .all(|interval| (interval - mean).abs() <= self.prt_tolerance)
            .then_some(mean)
    }
}
