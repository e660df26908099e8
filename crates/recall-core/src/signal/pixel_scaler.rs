//! Downsampling of processed samples to one value per pixel column

use crate::error::{WaveformError, WaveformResult};

/// Map samples onto exactly `target_width` pixels
///
/// Skips the first `skip_initial` samples (the overlap region) and picks the
/// nearest sample at a floating stride of `available / target_width`.
/// Pixels whose source index reaches `num_available` stay zero.
pub fn to_pixel_resolution(
    samples: &[f64],
    skip_initial: usize,
    target_width: usize,
    num_available: usize,
) -> WaveformResult<Vec<f64>> {
    if target_width == 0 {
        return Err(WaveformError::InvalidPixelWidth(target_width));
    }
    if skip_initial >= samples.len() {
        return Err(WaveformError::InvalidSkip {
            skip: skip_initial,
            len: samples.len(),
        });
    }

    let available = samples.len() - skip_initial;
    let increment = available as f64 / target_width as f64;
    let mut pixels = vec![0.0; target_width];

    for (i, pixel) in pixels.iter_mut().enumerate() {
        let index = (i as f64 * increment) as usize + skip_initial;
        if index >= num_available || index >= samples.len() {
            break;
        }
        *pixel = samples[index];
    }

    Ok(pixels)
}

/// Flatten single-pixel peaks and valleys in place
///
/// A strict local peak takes the larger of its two neighbours, a strict local
/// valley the smaller. Every comparison reads the unmodified input, so the
/// result does not depend on iteration order.
pub fn smooth_pixels(pixels: &mut [f64]) {
    if pixels.len() < 3 {
        return;
    }

    let original = pixels.to_vec();
    for i in 1..original.len() - 1 {
        let (prev, cur, next) = (original[i - 1], original[i], original[i + 1]);
        if cur > prev && cur > next {
            pixels[i] = prev.max(next);
        } else if cur < prev && cur < next {
            pixels[i] = prev.min(next);
        }
    }
}

/// Largest sustained amplitude: `max(min(v[i], v[i + 1]))` from `skip_initial` on
///
/// Rewards amplitude held over two adjacent columns, so a lone spike does not
/// squash the vertical scale. Returns 0 for windows shorter than two pixels.
pub fn rendering_peak(pixels: &[f64], skip_initial: usize) -> f64 {
    if pixels.len() < skip_initial.saturating_add(2) {
        return 0.0;
    }

    pixels[skip_initial..]
        .windows(2)
        .map(|w| w[0].min(w[1]))
        .fold(0.0, f64::max)
}
