//! Vertical scaling of waveform amplitudes
//!
//! The pixel scale maps the global rendering peak onto just under half the
//! image height, so sustained amplitude fills the strip without clipping.

use std::fmt;

use crate::error::{WaveformError, WaveformResult};

/// Pixels per unit amplitude for an image of `display_height`
///
/// Computes `((display_height / 2) - 1) / peak` (integer halving, as the
/// centre line sits at `height / 2`). Falls back to 0, a flat line, when the
/// peak is zero, negative or NaN, or the ratio is not finite.
pub fn pixel_scale(_samples: &[f64], display_height: u32, peak: f64) -> WaveformResult<f64> {
    if display_height == 0 {
        return Err(WaveformError::InvalidDisplayHeight(display_height));
    }

    if !(peak > 0.0) {
        log::warn!("No meaningful amplitude found (peak={}), using scale 0", peak);
        return Ok(0.0);
    }

    let scale = ((display_height / 2) as f64 - 1.0) / peak;
    if !scale.is_finite() {
        log::warn!("Pixel scale is infinite or NaN (peak={}), using 0 instead", peak);
        return Ok(0.0);
    }

    log::trace!(
        "Calculated pixel scale: {} (peak={}, height={})",
        scale,
        peak,
        display_height
    );
    Ok(scale)
}

/// Scale samples in place so the largest |x| equals `target_peak`
///
/// Silent buffers are left untouched.
pub fn normalize(samples: &mut [f64], target_peak: f64) -> WaveformResult<()> {
    if !(target_peak > 0.0) {
        return Err(WaveformError::InvalidTargetPeak(target_peak));
    }

    let current_peak = samples.iter().fold(0.0f64, |peak, s| peak.max(s.abs()));
    if current_peak == 0.0 {
        log::debug!("All samples are zero, no normalization needed");
        return Ok(());
    }

    let factor = target_peak / current_peak;
    for sample in samples.iter_mut() {
        *sample *= factor;
    }
    log::debug!(
        "Normalized {} samples: peak {} -> {} (scale={})",
        samples.len(),
        current_peak,
        target_peak,
        factor
    );
    Ok(())
}

/// Summary statistics over a sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmplitudeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
    pub peak: f64,
    pub sample_count: usize,
}

impl fmt::Display for AmplitudeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AmplitudeStats{{min={:.3}, max={:.3}, mean={:.3}, rms={:.3}, peak={:.3}, n={}}}",
            self.min, self.max, self.mean, self.rms, self.peak, self.sample_count
        )
    }
}

/// Compute min, max, mean, rms and peak of a buffer (all zero when empty)
pub fn amplitude_stats(samples: &[f64]) -> AmplitudeStats {
    if samples.is_empty() {
        return AmplitudeStats::default();
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut sum_squares = 0.0;
    for &s in samples {
        min = min.min(s);
        max = max.max(s);
        sum += s;
        sum_squares += s * s;
    }

    let n = samples.len() as f64;
    AmplitudeStats {
        min,
        max,
        mean: sum / n,
        rms: (sum_squares / n).sqrt(),
        peak: min.abs().max(max.abs()),
        sample_count: samples.len(),
    }
}
