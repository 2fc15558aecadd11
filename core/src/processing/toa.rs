//! Time-of-arrival extraction from four filtered, synchronized frames.
//!
//! Two estimators run independently. Break-wall detection finds the first
//! envelope sample that reaches a fixed fraction of the pulse's plateau level.
//! Cross-correlation against channel 1 finds lags to within a fraction of a
//! sample, but the carrier makes neighbouring peaks one wavelength apart
//! nearly equal, so the break-wall lag picks which peak is meant. A
//! [`ReconcilePolicy`] then decides whether the two agree.

use crate::config::{DerivedParameters, PingerConfig};
use crate::math::stats::StatsHelper;
use crate::prelude::{Channel, ChannelSet};
use crate::processing::spectral::FilteredFrame;
use crate::telemetry::log::LogManager;

/// Break-wall arrival on one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakWall {
    pub channel: Channel,
    pub index: usize,
    /// Seconds from the frame start.
    pub time: f64,
}

/// Local maximum of a cross-correlation, refined to sub-sample lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    pub lag: f64,
    pub value: f64,
}

/// Delay of one channel relative to channel 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairDelay {
    pub channel: Channel,
    /// Break-wall index difference, in samples.
    pub break_wall_lag: f64,
    /// Selected cross-correlation lag, in samples.
    pub correlation_lag: f64,
    /// Reconciled delay, in seconds; positive when the channel hears the pulse later.
    pub delay: f64,
    /// Set when the estimators differed by more than the agreement window.
    pub disputed: bool,
}

/// Per-cycle arrival estimates feeding the geolocation solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ToaSet {
    pub arrivals: ChannelSet<BreakWall>,
    /// Delays of channels 2, 3 and 4.
    pub delays: [PairDelay; 3],
    /// Channel-1 arrival refined by every channel, seconds from the frame start.
    pub primary_toa: f64,
}

impl ToaSet {
    /// Reconciled tD2, tD3, tD4 in seconds.
    pub fn delay_seconds(&self) -> [f64; 3] {
        self.delays.map(|pair| pair.delay)
    }

    pub fn head_index(&self) -> usize {
        self.arrivals.get(Channel::One).index
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToaFault {
    #[error("no threshold crossing on channel {}", .0.number())]
    NoCrossing(Channel),
    #[error("no correlation peak within ±{bound} lags for channel {}", .channel.number())]
    NoCorrelationPeak { channel: Channel, bound: usize },
    #[error("break-wall and cross-correlation disagree by {samples:.1} samples on channel {}", .channel.number())]
    Disagreement { channel: Channel, samples: f64 },
}

/// Envelope samples at or above this fraction of the peak form the pulse plateau.
const PLATEAU_FRACTION: f64 = 0.5;

/// First index where the envelope reaches `threshold` times the pulse's
/// expected peak.
///
/// The expected peak is the median of the plateau samples rather than the
/// single largest sample, which sits on filter ringing at the frame edges.
/// Returns `None` when the envelope peak is below `floor`, i.e. no pulse is
/// present.
pub fn break_wall_index(envelope: &[f64], threshold: f64, floor: f64) -> Option<usize> {
    let peak = StatsHelper::peak_abs(envelope);
    if !peak.is_finite() || peak < floor {
        return None;
    }
    let plateau: Vec<f64> = envelope
        .iter()
        .map(|value| value.abs())
        .filter(|&value| value >= PLATEAU_FRACTION * peak)
        .collect();
    let level = threshold * StatsHelper::median(&plateau).unwrap_or(peak);
    envelope.iter().position(|value| value.abs() >= level)
}

/// Overlap-normalised correlation of `other` against `reference` for lags
/// `-bound..=bound`; element `j` holds lag `j - bound`.
pub fn cross_correlate(reference: &[f64], other: &[f64], bound: usize) -> Vec<f64> {
    let n = reference.len().min(other.len()) as isize;
    let bound = bound as isize;
    (-bound..=bound)
        .map(|lag| {
            let start = (-lag).max(0);
            let end = (n - lag).min(n);
            if end <= start {
                return 0.0;
            }
            let first = &reference[start as usize..end as usize];
            let second = &other[(start + lag) as usize..(end + lag) as usize];
            let sum: f64 = first.iter().zip(second).map(|(a, b)| a * b).sum();
            sum / (end - start) as f64
        })
        .collect()
}

/// Positive interior local maxima, strongest first, at most `max_peaks`.
pub fn correlation_peaks(correlation: &[f64], bound: usize, max_peaks: usize) -> Vec<CorrelationPeak> {
    let mut peaks: Vec<CorrelationPeak> = (1..correlation.len().saturating_sub(1))
        .filter(|&j| {
            let value = correlation[j];
            value > 0.0 && value > correlation[j - 1] && value >= correlation[j + 1]
        })
        .map(|j| {
            let (prev, peak, next) = (correlation[j - 1], correlation[j], correlation[j + 1]);
            let denom = prev - 2.0 * peak + next;
            let delta = if denom.abs() > f64::EPSILON {
                (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            CorrelationPeak {
                lag: j as f64 - bound as f64 + delta,
                value: peak,
            }
        })
        .collect();

    peaks.sort_by(|a, b| b.value.total_cmp(&a.value).then(a.lag.total_cmp(&b.lag)));
    peaks.truncate(max_peaks);
    peaks
}

/// Candidate nearest `anchor_lag`; ties go to the stronger peak.
pub fn select_peak(peaks: &[CorrelationPeak], anchor_lag: f64) -> Option<CorrelationPeak> {
    peaks.iter().copied().fold(None, |best, peak| match best {
        None => Some(peak),
        Some(current) => {
            let current_distance = (current.lag - anchor_lag).abs();
            let distance = (peak.lag - anchor_lag).abs();
            if distance < current_distance
                || (distance == current_distance && peak.value > current.value)
            {
                Some(peak)
            } else {
                Some(current)
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    Agreed { delay_samples: f64 },
    Disputed { delay_samples: f64, disagreement: f64 },
    Resync { disagreement: f64 },
}

/// Prefers the correlation lag while it stays close to the break-wall lag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilePolicy {
    /// Agreement window, in samples.
    pub agree: f64,
    /// Disagreement beyond this many samples forces a resync.
    pub resync: f64,
}

impl ReconcilePolicy {
    pub fn from_config(config: &PingerConfig, params: &DerivedParameters) -> Self {
        Self {
            agree: config.agree_tolerance * params.samples_per_wavelength,
            resync: config.resync_tolerance * params.samples_per_wavelength,
        }
    }

    pub fn reconcile(&self, break_wall_lag: f64, correlation_lag: f64) -> Reconciliation {
        let disagreement = (correlation_lag - break_wall_lag).abs();
        if disagreement <= self.agree {
            Reconciliation::Agreed {
                delay_samples: correlation_lag,
            }
        } else if disagreement <= self.resync {
            Reconciliation::Disputed {
                delay_samples: correlation_lag,
                disagreement,
            }
        } else {
            Reconciliation::Resync { disagreement }
        }
    }
}

pub struct ToaExtractor {
    threshold: f64,
    detection_floor: f64,
    sample_period: f64,
    lag_bound: usize,
    max_peaks: usize,
    policy: ReconcilePolicy,
    logger: LogManager,
}

impl ToaExtractor {
    pub fn new(config: &PingerConfig, params: &DerivedParameters) -> Self {
        Self {
            threshold: config.threshold,
            detection_floor: config.detection_floor,
            sample_period: params.sample_period,
            lag_bound: params.lag_bound,
            max_peaks: params.max_peaks,
            policy: ReconcilePolicy::from_config(config, params),
            logger: LogManager::new("toa"),
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    pub fn extract(&self, frames: &ChannelSet<FilteredFrame>) -> Result<ToaSet, ToaFault> {
        let arrivals = ChannelSet::new([
            self.break_wall(frames, Channel::One)?,
            self.break_wall(frames, Channel::Two)?,
            self.break_wall(frames, Channel::Three)?,
            self.break_wall(frames, Channel::Four)?,
        ]);
        let delays = [
            self.pair_delay(frames, &arrivals, Channel::Two)?,
            self.pair_delay(frames, &arrivals, Channel::Three)?,
            self.pair_delay(frames, &arrivals, Channel::Four)?,
        ];

        let mut refined = vec![arrivals.get(Channel::One).time];
        refined.extend(
            delays
                .iter()
                .map(|pair| arrivals.get(pair.channel).time - pair.delay),
        );
        let primary_toa = StatsHelper::mean(&refined).unwrap_or(arrivals.get(Channel::One).time);

        Ok(ToaSet {
            arrivals,
            delays,
            primary_toa,
        })
    }

    fn break_wall(
        &self,
        frames: &ChannelSet<FilteredFrame>,
        channel: Channel,
    ) -> Result<BreakWall, ToaFault> {
        let envelope = &frames.get(channel).envelope.samples;
        let index = break_wall_index(envelope, self.threshold, self.detection_floor)
            .ok_or(ToaFault::NoCrossing(channel))?;
        Ok(BreakWall {
            channel,
            index,
            time: index as f64 * self.sample_period,
        })
    }

    fn pair_delay(
        &self,
        frames: &ChannelSet<FilteredFrame>,
        arrivals: &ChannelSet<BreakWall>,
        channel: Channel,
    ) -> Result<PairDelay, ToaFault> {
        let break_wall_lag =
            arrivals.get(channel).index as f64 - arrivals.get(Channel::One).index as f64;
        let correlation = cross_correlate(
            &frames.get(Channel::One).waveform.samples,
            &frames.get(channel).waveform.samples,
            self.lag_bound,
        );
        let peaks = correlation_peaks(&correlation, self.lag_bound, self.max_peaks);
        let peak = select_peak(&peaks, break_wall_lag).ok_or(ToaFault::NoCorrelationPeak {
            channel,
            bound: self.lag_bound,
        })?;

        let (delay_samples, disputed) = match self.policy.reconcile(break_wall_lag, peak.lag) {
            Reconciliation::Agreed { delay_samples } => (delay_samples, false),
            Reconciliation::Disputed {
                delay_samples,
                disagreement,
            } => {
                self.logger.warn(&format!(
                    "channel {} estimators differ by {:.1} samples, using correlation lag",
                    channel.number(),
                    disagreement
                ));
                (delay_samples, true)
            }
            Reconciliation::Resync { disagreement } => {
                return Err(ToaFault::Disagreement {
                    channel,
                    samples: disagreement,
                })
            }
        };

        Ok(PairDelay {
            channel,
            break_wall_lag,
            correlation_lag: peak.lag,
            delay: delay_samples * self.sample_period,
            disputed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn break_wall_finds_first_crossing_left_to_right() {
        let envelope = [0.0, 0.1, 0.5, 0.95, 1.0, 0.2, 0.99];
        assert_eq!(break_wall_index(&envelope, 0.9, 0.05), Some(3));
    }

    #[test]
    fn break_wall_level_ignores_edge_overshoot() {
        let envelope = [0.0, 0.5, 0.92, 1.0, 1.0, 1.0, 1.3];
        assert_eq!(break_wall_index(&envelope, 0.9, 0.05), Some(2));
    }

    #[test]
    fn break_wall_ignores_frames_below_floor() {
        let envelope = [0.0, 0.01, 0.02, 0.01];
        assert_eq!(break_wall_index(&envelope, 0.9, 0.05), None);
    }

    #[test]
    fn cross_correlation_recovers_known_shift() {
        let (config, params) = testing::default_setup();
        let frames = testing::filtered_channels(&config, &params, [330.0, 340.0, 330.0, 330.0], 0.5);
        let correlation = cross_correlate(
            &frames.get(Channel::One).waveform.samples,
            &frames.get(Channel::Two).waveform.samples,
            params.lag_bound,
        );
        assert_eq!(correlation.len(), 2 * params.lag_bound + 1);

        let peaks = correlation_peaks(&correlation, params.lag_bound, params.max_peaks);
        let peak = select_peak(&peaks, 10.0).unwrap();
        assert!((peak.lag - 10.0).abs() < 0.5, "lag {}", peak.lag);
    }

    #[test]
    fn peak_selection_is_bounded_and_deterministic() {
        let (config, params) = testing::default_setup();
        let frames = testing::filtered_channels(&config, &params, [330.0, 330.0, 361.2, 330.0], 0.5);
        let correlation = cross_correlate(
            &frames.get(Channel::One).waveform.samples,
            &frames.get(Channel::Three).waveform.samples,
            params.lag_bound,
        );
        let peaks = correlation_peaks(&correlation, params.lag_bound, params.max_peaks);

        assert!(!peaks.is_empty());
        assert!(peaks.len() <= params.max_peaks);
        for peak in &peaks {
            assert!(peak.lag.abs() <= params.lag_bound as f64);
        }

        let anchor = 29.0;
        let first = select_peak(&peaks, anchor).unwrap();
        let second = select_peak(&peaks, anchor).unwrap();
        assert_eq!(first, second);
        assert!((first.lag - anchor).abs() <= params.samples_per_wavelength);
        assert!((first.lag - 31.2).abs() < 0.5, "lag {}", first.lag);
    }

    #[test]
    fn select_peak_breaks_ties_by_strength() {
        let peaks = [
            CorrelationPeak { lag: -5.0, value: 0.4 },
            CorrelationPeak { lag: 5.0, value: 0.6 },
        ];
        assert_eq!(select_peak(&peaks, 0.0).unwrap().lag, 5.0);
        assert_eq!(select_peak(&[], 0.0), None);
    }

    #[test]
    fn reconcile_prefers_correlation_within_tolerance() {
        let policy = ReconcilePolicy {
            agree: 12.0,
            resync: 36.0,
        };
        assert_eq!(
            policy.reconcile(10.0, 10.4),
            Reconciliation::Agreed { delay_samples: 10.4 }
        );
        assert_eq!(
            policy.reconcile(10.0, 30.0),
            Reconciliation::Disputed {
                delay_samples: 30.0,
                disagreement: 20.0
            }
        );
        assert_eq!(
            policy.reconcile(10.0, 60.0),
            Reconciliation::Resync { disagreement: 50.0 }
        );
    }

    #[test]
    fn extract_reports_delays_relative_to_channel_one() {
        let (config, params) = testing::burst_setup();
        let onsets = [330.0, 340.5, 361.2, 325.0];
        let frames = testing::filtered_channels(&config, &params, onsets, 0.5);
        let extractor = ToaExtractor::new(&config, &params);

        let toa = extractor.extract(&frames).unwrap();
        let expected = [10.5, 31.2, -5.0];
        for (pair, want) in toa.delays.iter().zip(expected) {
            let got = pair.delay / params.sample_period;
            assert!((got - want).abs() < 0.5, "{:?}: {} vs {}", pair.channel, got, want);
            assert!(!pair.disputed);
        }

        let head_time = toa.arrivals.get(Channel::One).time;
        assert!((toa.primary_toa - head_time).abs() < 3.0 * params.sample_period);
    }

    #[test]
    fn silent_channel_yields_no_crossing() {
        let (config, params) = testing::burst_setup();
        let frames = testing::filtered_channels(&config, &params, [330.0, 330.0, 330.0, 330.0], 0.5);
        let [one, two, three, mut four] = frames.into_inner();
        four.envelope.samples.iter_mut().for_each(|v| *v = 0.0);
        let frames = ChannelSet::new([one, two, three, four]);

        let extractor = ToaExtractor::new(&config, &params);
        assert_eq!(
            extractor.extract(&frames),
            Err(ToaFault::NoCrossing(Channel::Four))
        );
    }
}
