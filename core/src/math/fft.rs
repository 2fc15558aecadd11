use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Helper that wraps forward and inverse `rustfft` plans for one frame size.
pub struct FftHelper {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    size: usize,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            forward,
            inverse,
            scratch: vec![Complex64::zero(); scratch_len],
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Transforms real samples, zero-padding or truncating to the plan size.
    pub fn forward(&mut self, input: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input
            .iter()
            .map(|&value| Complex64::new(value, 0.0))
            .collect();
        buffer.resize(self.size, Complex64::zero());

        self.forward.process_with_scratch(&mut buffer, &mut self.scratch);
        buffer
    }

    /// Inverse transform scaled by 1/N so that `inverse(forward(x)) == x`.
    pub fn inverse(&mut self, mut buffer: Vec<Complex64>) -> Vec<Complex64> {
        buffer.resize(self.size, Complex64::zero());
        self.inverse.process_with_scratch(&mut buffer, &mut self.scratch);

        let scale = 1.0 / self.size as f64;
        buffer.iter_mut().for_each(|value| *value *= scale);
        buffer
    }
}
