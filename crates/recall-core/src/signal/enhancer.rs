//! Band-pass filtering and envelope smoothing of raw sample buffers

use std::collections::VecDeque;

use super::bandpass::BandPassFilter;
use crate::error::{WaveformError, WaveformResult};
use crate::types::FrequencyRange;

/// Band-pass filter a buffer over normalized `[min_frequency, max_frequency]`
///
/// Builds a fresh filter on every call; the processor keeps its own cache
/// for the hot path.
pub fn bandpass_filter(samples: &[f64], min_frequency: f64, max_frequency: f64) -> WaveformResult<Vec<f64>> {
    let range = FrequencyRange::new(min_frequency, max_frequency)?;
    Ok(BandPassFilter::new(range).apply(samples))
}

/// Replace each sample with the largest |x| within `±window` samples
///
/// The window is inclusive on both sides and always reads the original
/// buffer. Runs in O(n) using a monotonic deque of indices whose absolute
/// values decrease from front to back.
pub fn envelope_smooth(samples: &mut [f64], window: usize) -> WaveformResult<()> {
    if window < 1 {
        return Err(WaveformError::InvalidWindowSize(window));
    }
    let n = samples.len();
    if n == 0 {
        return Ok(());
    }

    let magnitudes: Vec<f64> = samples.iter().map(|s| s.abs()).collect();
    let mut deque: VecDeque<usize> = VecDeque::with_capacity(2 * window + 1);
    let mut next = 0;

    for i in 0..n {
        let window_end = (i + window).min(n - 1);
        while next <= window_end {
            while deque.back().is_some_and(|&j| magnitudes[j] <= magnitudes[next]) {
                deque.pop_back();
            }
            deque.push_back(next);
            next += 1;
        }

        let window_start = i.saturating_sub(window);
        while deque.front().is_some_and(|&j| j < window_start) {
            deque.pop_front();
        }

        samples[i] = deque.front().map_or(0.0, |&j| magnitudes[j]);
    }

    Ok(())
}
