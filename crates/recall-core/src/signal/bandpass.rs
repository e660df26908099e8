//! Windowed-sinc band-pass filter
//!
//! The kernel is the difference of two Blackman-windowed low-pass sincs, each
//! normalized to unity DC gain. Building the kernel is the expensive part, which
//! is why the waveform processor caches filters per [`FrequencyRange`].
//!
//! The kernel is applied centred (zero phase), so filtered output lines up with
//! the input sample for sample. Samples outside the buffer count as silence.

use crate::types::FrequencyRange;

/// Transition bandwidth (normalized) used to size the kernel
pub const DEFAULT_TRANSITION_BANDWIDTH: f64 = 0.02;

/// FIR band-pass filter over a normalized frequency range
#[derive(Debug, Clone)]
pub struct BandPassFilter {
    range: FrequencyRange,
    kernel: Vec<f64>,
}

impl BandPassFilter {
    /// Build a filter with the default transition bandwidth
    pub fn new(range: FrequencyRange) -> Self {
        Self::with_transition_bandwidth(range, DEFAULT_TRANSITION_BANDWIDTH)
    }

    /// Build a filter whose kernel length is `4 / transition_bandwidth` (odd)
    pub fn with_transition_bandwidth(range: FrequencyRange, transition_bandwidth: f64) -> Self {
        let order = ((4.0 / transition_bandwidth.max(1e-4)).round() as usize).max(2);
        // Even order -> odd kernel length with a centre tap
        let order = order + order % 2;

        let low = lowpass_kernel(range.min_frequency(), order);
        let high = lowpass_kernel(range.max_frequency(), order);
        let kernel = high.iter().zip(low.iter()).map(|(h, l)| h - l).collect();

        Self { range, kernel }
    }

    pub fn range(&self) -> FrequencyRange {
        self.range
    }

    pub fn kernel_len(&self) -> usize {
        self.kernel.len()
    }

    /// Filter a buffer, returning a new buffer of the same length
    ///
    /// Runs on the calling thread. Callers render whole chunks on a worker
    /// pool, and this may run inside a chunk's once-only initialisation, so it
    /// must not hand work to a pool that could re-enter that initialisation.
    pub fn apply(&self, samples: &[f64]) -> Vec<f64> {
        let n = samples.len();
        let half = self.kernel.len() / 2;
        let kernel = &self.kernel;

        (0..n)
            .map(|i| {
                // Input index for kernel tap k is i + k - half
                let k_start = half.saturating_sub(i);
                let k_end = kernel.len().min(n + half - i);
                kernel[k_start..k_end]
                    .iter()
                    .zip(&samples[i + k_start - half..i + k_end - half])
                    .map(|(k, x)| k * x)
                    .sum()
            })
            .collect()
    }
}

/// Blackman-windowed sinc low-pass with unity DC gain
///
/// A cutoff of 0 yields an all-zero kernel (nothing passes).
fn lowpass_kernel(cutoff: f64, order: usize) -> Vec<f64> {
    use std::f64::consts::PI;

    let m = order as f64;
    let mut kernel: Vec<f64> = (0..=order)
        .map(|n| {
            let x = n as f64 - m / 2.0;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let window = 0.42 - 0.5 * (2.0 * PI * n as f64 / m).cos()
                + 0.08 * (4.0 * PI * n as f64 / m).cos();
            sinc * window
        })
        .collect();

    let sum: f64 = kernel.iter().sum();
    if sum.abs() > f64::EPSILON {
        for tap in kernel.iter_mut() {
            *tap /= sum;
        }
    }
    kernel
}
