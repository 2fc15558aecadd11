use crate::config::{DerivedParameters, PingerConfig};
use crate::math::fft::FftHelper;
use crate::prelude::{Frame, PipelineError, PipelineResult};
use num_complex::Complex64;
use rustfft::num_traits::Zero;

/// Complex spectrum of one frame, centered on 0 Hz: bin `i` holds frequency
/// `f0 * (i - N/2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub bins: Vec<Complex64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Binary frequency-domain mask, fixed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BandpassMask {
    bins: Vec<Complex64>,
}

impl BandpassMask {
    /// Passes bins whose |f| lies in `[center - half_width, center + half_width]`.
    pub fn ideal(axis: &[f64], center: f64, half_width: f64) -> Self {
        let low = center - half_width;
        let high = center + half_width;
        let bins = axis
            .iter()
            .map(|f| {
                let magnitude = f.abs();
                if magnitude >= low && magnitude <= high {
                    Complex64::new(1.0, 0.0)
                } else {
                    Complex64::zero()
                }
            })
            .collect();
        Self { bins }
    }

    pub fn all_pass(size: usize) -> Self {
        Self {
            bins: vec![Complex64::new(1.0, 0.0); size],
        }
    }

    pub fn bins(&self) -> &[Complex64] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// True when every bin equals its mirror across 0 Hz. The most negative
    /// bin has no positive counterpart and is skipped.
    pub fn is_symmetric(&self) -> bool {
        let n = self.bins.len();
        (1..n).all(|i| self.bins[i] == self.bins[n - i])
    }
}

/// Double-sided frequency axis for `size` bins at resolution `resolution`.
pub fn frequency_axis(size: usize, resolution: f64) -> Vec<f64> {
    let half = (size / 2) as f64;
    (0..size)
        .map(|i| resolution * (i as f64 - half))
        .collect()
}

/// Filtered waveform of one channel with its envelope and passband power.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredFrame {
    pub waveform: Frame,
    pub envelope: Frame,
    pub passband_power: f64,
}

/// Forward/inverse transforms plus the precomputed bandpass mask.
pub struct SpectralEngine {
    fft: FftHelper,
    axis: Vec<f64>,
    mask: BandpassMask,
}

impl SpectralEngine {
    pub fn new(config: &PingerConfig, params: &DerivedParameters) -> Self {
        let axis = frequency_axis(params.frame_size, params.frequency_resolution);
        let mask = BandpassMask::ideal(&axis, config.filter_center, config.filter_half_width);
        Self {
            fft: FftHelper::new(params.frame_size),
            axis,
            mask,
        }
    }

    pub fn frequency_axis(&self) -> &[f64] {
        &self.axis
    }

    pub fn mask(&self) -> &BandpassMask {
        &self.mask
    }

    pub fn to_frequency_domain(&mut self, frame: &Frame) -> PipelineResult<Spectrum> {
        if frame.len() != self.fft.size() {
            return Err(PipelineError::InvalidInput(format!(
                "frame has {} samples, expected {}",
                frame.len(),
                self.fft.size()
            )));
        }
        ensure_finite_samples("forward transform input", &frame.samples)?;

        let mut bins = self.fft.forward(&frame.samples);
        let half = bins.len() / 2;
        bins.rotate_right(half);
        ensure_finite_bins("forward transform", &bins)?;
        Ok(Spectrum { bins })
    }

    pub fn apply_mask(spectrum: &Spectrum, mask: &BandpassMask) -> PipelineResult<Spectrum> {
        if spectrum.len() != mask.len() {
            return Err(PipelineError::InvalidInput(format!(
                "spectrum has {} bins, mask has {}",
                spectrum.len(),
                mask.len()
            )));
        }
        let bins = spectrum
            .bins
            .iter()
            .zip(mask.bins())
            .map(|(value, gate)| *value * *gate)
            .collect();
        Ok(Spectrum { bins })
    }

    /// Real part of the inverse transform, stamped with `start_time`.
    pub fn to_time_domain(&mut self, spectrum: &Spectrum, start_time: f64) -> PipelineResult<Frame> {
        let samples = self
            .inverse_centered(spectrum)?
            .into_iter()
            .map(|value| value.re)
            .collect::<Vec<_>>();
        ensure_finite_samples("inverse transform", &samples)?;
        Ok(Frame::new(start_time, samples))
    }

    /// Magnitude of the analytic signal carried by `spectrum`.
    pub fn envelope(&mut self, spectrum: &Spectrum, start_time: f64) -> PipelineResult<Frame> {
        let analytic = Spectrum {
            bins: spectrum
                .bins
                .iter()
                .zip(self.axis.iter())
                .map(|(value, &frequency)| {
                    if frequency > 0.0 {
                        *value * 2.0
                    } else if frequency == 0.0 {
                        *value
                    } else {
                        Complex64::zero()
                    }
                })
                .collect(),
        };
        let samples = self
            .inverse_centered(&analytic)?
            .into_iter()
            .map(|value| value.norm())
            .collect::<Vec<_>>();
        ensure_finite_samples("envelope", &samples)?;
        Ok(Frame::new(start_time, samples))
    }

    /// Mean-square power of the band-limited signal: Σ|X|²·mask / N².
    pub fn passband_power(spectrum: &Spectrum, mask: &BandpassMask) -> f64 {
        let n = spectrum.len() as f64;
        if n == 0.0 {
            return 0.0;
        }
        let energy: f64 = spectrum
            .bins
            .iter()
            .zip(mask.bins())
            .map(|(value, gate)| value.norm_sqr() * gate.re)
            .sum();
        energy / (n * n)
    }

    /// Bandpass-filters a raw frame.
    pub fn filter(&mut self, frame: &Frame) -> PipelineResult<FilteredFrame> {
        let spectrum = self.to_frequency_domain(frame)?;
        let passband = Self::apply_mask(&spectrum, &self.mask)?;
        let passband_power = Self::passband_power(&spectrum, &self.mask);
        let waveform = self.to_time_domain(&passband, frame.start_time)?;
        let envelope = self.envelope(&passband, frame.start_time)?;
        Ok(FilteredFrame {
            waveform,
            envelope,
            passband_power,
        })
    }

    fn inverse_centered(&mut self, spectrum: &Spectrum) -> PipelineResult<Vec<Complex64>> {
        if spectrum.len() != self.fft.size() {
            return Err(PipelineError::InvalidInput(format!(
                "spectrum has {} bins, expected {}",
                spectrum.len(),
                self.fft.size()
            )));
        }
        ensure_finite_bins("inverse transform input", &spectrum.bins)?;
        let mut bins = spectrum.bins.clone();
        let half = bins.len() / 2;
        bins.rotate_left(half);
        Ok(self.fft.inverse(bins))
    }
}

fn ensure_finite_samples(stage: &'static str, samples: &[f64]) -> PipelineResult<()> {
    match samples.iter().position(|value| !value.is_finite()) {
        Some(index) => Err(PipelineError::Numerical {
            stage,
            detail: format!("non-finite sample at index {}", index),
        }),
        None => Ok(()),
    }
}

fn ensure_finite_bins(stage: &'static str, bins: &[Complex64]) -> PipelineResult<()> {
    match bins.iter().position(|value| !value.is_finite()) {
        Some(index) => Err(PipelineError::Numerical {
            stage,
            detail: format!("non-finite bin at index {}", index),
        }),
        None => Ok(()),
    }
}
