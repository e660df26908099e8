//! Per-chunk signal pipeline
//!
//! Turns one chunk of raw audio into one amplitude value per pixel column:
//!
//! 1. read the chunk plus its leading overlap from the [`AudioSource`]
//! 2. band-pass filter the whole buffer (overlap included, so the filter settles
//!    before the chunk boundary)
//! 3. envelope-smooth the filtered buffer
//! 4. downsample past the overlap to the target width and flatten lone
//!    peaks/valleys
//!
//! A failed read never propagates. The chunk comes back as a zero-filled strip
//! and a warning is logged, since reads can fail transiently while files are
//! being switched.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use recall_core::audio_file::AudioSource;
use recall_core::sample_math;
use recall_core::signal::{envelope_smooth, smooth_pixels, to_pixel_resolution, BandPassFilter};
use recall_core::{FrequencyRange, WaveformError, WaveformResult};

/// Runs the read/filter/smooth/downsample pipeline for single chunks
///
/// Shared between render threads; the only mutable state is the filter cache.
pub struct WaveformProcessor {
    source: Arc<dyn AudioSource>,
    envelope_window: usize,
    /// `None` when filter caching is disabled
    filter_cache: Option<Mutex<HashMap<FrequencyRange, Arc<BandPassFilter>>>>,
    /// Number of filter kernels built so far
    filters_built: AtomicU64,
}

impl WaveformProcessor {
    /// Create a processor
    ///
    /// # Arguments
    /// * `source` - Where raw chunk samples come from
    /// * `envelope_window` - Half-width of the envelope smoothing window
    /// * `cache_filters` - Keep one filter per frequency range instead of
    ///   rebuilding coefficients for every chunk
    pub fn new(
        source: Arc<dyn AudioSource>,
        envelope_window: usize,
        cache_filters: bool,
    ) -> WaveformResult<Self> {
        if envelope_window == 0 {
            return Err(WaveformError::InvalidWindowSize(envelope_window));
        }
        Ok(Self {
            source,
            envelope_window,
            filter_cache: cache_filters.then(|| Mutex::new(HashMap::new())),
            filters_built: AtomicU64::new(0),
        })
    }

    /// Audio source this processor reads from
    pub fn source(&self) -> &Arc<dyn AudioSource> {
        &self.source
    }

    /// Number of band-pass kernels constructed since creation
    pub fn filters_built(&self) -> u64 {
        self.filters_built.load(Ordering::Relaxed)
    }

    /// Process one chunk into `target_width` pixel amplitudes
    ///
    /// Frequencies are normalized to the sample rate (0.0 - 0.5). Returns an
    /// error only for invalid arguments; audio read failures yield zeros.
    #[allow(clippy::too_many_arguments)]
    pub fn process_audio_for_display(
        &self,
        path: &Path,
        chunk_index: u32,
        chunk_seconds: f64,
        overlap_seconds: f64,
        min_frequency: f64,
        max_frequency: f64,
        target_width: usize,
    ) -> WaveformResult<Vec<f64>> {
        if target_width == 0 {
            return Err(WaveformError::InvalidPixelWidth(target_width));
        }
        if !(chunk_seconds > 0.0) {
            return Err(WaveformError::InvalidChunkSize(chunk_seconds));
        }
        if !(overlap_seconds >= 0.0) {
            return Err(WaveformError::NegativeDuration(overlap_seconds));
        }
        let range = FrequencyRange::new(min_frequency, max_frequency)?;

        let chunk = match self
            .source
            .read_chunk(path, chunk_index, chunk_seconds, overlap_seconds)
        {
            Ok(chunk) => chunk,
            Err(e) => {
                log::warn!(
                    "[WAVEFORM] Failed to read audio chunk {} of {}: {}",
                    chunk_index,
                    path.display(),
                    e
                );
                return Ok(vec![0.0; target_width]);
            }
        };

        if chunk.is_empty() || chunk.sample_rate == 0 {
            return Ok(vec![0.0; target_width]);
        }

        let filter = self.filter_for(range);
        let mut samples = filter.apply(&chunk.samples);
        envelope_smooth(&mut samples, self.envelope_window)?;

        // A short final chunk keeps the full chunk's time scale; the pixels
        // past the end of the audio stay at zero.
        let frames_per_chunk =
            sample_math::seconds_to_frames(chunk_seconds, chunk.sample_rate as f64)? as usize;
        let full_len = chunk.overlap_frames + frames_per_chunk;
        if samples.len() < full_len {
            samples.resize(full_len, 0.0);
        }

        let mut pixels = to_pixel_resolution(
            &samples,
            chunk.overlap_frames,
            target_width,
            chunk.frame_count,
        )?;
        smooth_pixels(&mut pixels);
        Ok(pixels)
    }

    fn filter_for(&self, range: FrequencyRange) -> Arc<BandPassFilter> {
        let Some(cache) = &self.filter_cache else {
            return Arc::new(self.build_filter(range));
        };

        let mut filters = match cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        filters
            .entry(range)
            .or_insert_with(|| Arc::new(self.build_filter(range)))
            .clone()
    }

    fn build_filter(&self, range: FrequencyRange) -> BandPassFilter {
        log::debug!(
            "[WAVEFORM] Building band-pass filter {:.5}..{:.5}",
            range.min_frequency(),
            range.max_frequency()
        );
        self.filters_built.fetch_add(1, Ordering::Relaxed);
        BandPassFilter::new(range)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FailingSource, ToneSource};
    use super::*;

    const MIN: f64 = 1000.0 / 8000.0;
    const MAX: f64 = 0.4999999;

    fn processor(source: Arc<dyn AudioSource>, cache: bool) -> WaveformProcessor {
        WaveformProcessor::new(source, 20, cache).unwrap()
    }

    #[test]
    fn test_output_width_matches_request() {
        let p = processor(Arc::new(ToneSource::new(8000, 25.0)), true);
        for width in [1, 50, 2000] {
            let pixels = p
                .process_audio_for_display(Path::new("a.wav"), 1, 10.0, 0.25, MIN, MAX, width)
                .unwrap();
            assert_eq!(pixels.len(), width);
        }
    }

    #[test]
    fn test_read_failure_returns_zeros() {
        let p = processor(
            Arc::new(FailingSource {
                sample_rate: 8000,
                total_frames: 80_000,
            }),
            true,
        );
        let pixels = p
            .process_audio_for_display(Path::new("gone.wav"), 0, 10.0, 0.25, MIN, MAX, 300)
            .unwrap();
        assert_eq!(pixels, vec![0.0; 300]);
    }

    #[test]
    fn test_invalid_arguments_are_rejected() {
        let p = processor(Arc::new(ToneSource::new(8000, 5.0)), true);
        let path = Path::new("a.wav");
        assert!(p.process_audio_for_display(path, 0, 10.0, 0.25, MIN, MAX, 0).is_err());
        assert!(p.process_audio_for_display(path, 0, 10.0, 0.25, 0.3, 0.2, 10).is_err());
        assert!(p.process_audio_for_display(path, 0, 10.0, 0.25, -0.1, 0.2, 10).is_err());
        assert!(p.process_audio_for_display(path, 0, 10.0, 0.25, 0.1, 0.6, 10).is_err());
        assert!(p.process_audio_for_display(path, 0, 0.0, 0.25, MIN, MAX, 10).is_err());
        assert!(WaveformProcessor::new(Arc::new(ToneSource::new(8000, 1.0)), 0, true).is_err());
    }

    #[test]
    fn test_chunk_past_end_is_blank() {
        let p = processor(Arc::new(ToneSource::new(8000, 5.0)), true);
        let pixels = p
            .process_audio_for_display(Path::new("a.wav"), 3, 10.0, 0.25, MIN, MAX, 100)
            .unwrap();
        assert_eq!(pixels, vec![0.0; 100]);
    }

    #[test]
    fn test_short_last_chunk_keeps_time_scale() {
        // 5 s of audio in a 10 s chunk fills only the left half
        let p = processor(Arc::new(ToneSource::new(8000, 5.0)), true);
        let pixels = p
            .process_audio_for_display(Path::new("a.wav"), 0, 10.0, 0.25, MIN, MAX, 100)
            .unwrap();
        assert!(pixels[..45].iter().any(|&v| v > 0.0));
        assert!(pixels[51..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_filter_cache_builds_once_per_range() {
        let p = processor(Arc::new(ToneSource::new(8000, 30.0)), true);
        for chunk in 0..3 {
            p.process_audio_for_display(Path::new("a.wav"), chunk, 10.0, 0.25, MIN, MAX, 100)
                .unwrap();
        }
        assert_eq!(p.filters_built(), 1);

        p.process_audio_for_display(Path::new("a.wav"), 0, 10.0, 0.25, 0.05, 0.3, 100)
            .unwrap();
        assert_eq!(p.filters_built(), 2);
    }

    #[test]
    fn test_uncached_matches_cached() {
        let source: Arc<dyn AudioSource> = Arc::new(ToneSource::new(8000, 20.0));
        let cached = processor(source.clone(), true);
        let uncached = processor(source, false);
        let path = Path::new("a.wav");

        let a = cached
            .process_audio_for_display(path, 1, 10.0, 0.25, MIN, MAX, 400)
            .unwrap();
        let b = uncached
            .process_audio_for_display(path, 1, 10.0, 0.25, MIN, MAX, 400)
            .unwrap();
        assert_eq!(a, b);

        uncached
            .process_audio_for_display(path, 1, 10.0, 0.25, MIN, MAX, 400)
            .unwrap();
        assert_eq!(uncached.filters_built(), 2);
    }

    #[test]
    fn test_output_is_non_negative_envelope() {
        let p = processor(Arc::new(ToneSource::new(8000, 10.0)), true);
        let pixels = p
            .process_audio_for_display(Path::new("a.wav"), 0, 10.0, 0.25, MIN, MAX, 500)
            .unwrap();
        assert!(pixels.iter().all(|&v| v >= 0.0));
        assert!(pixels.iter().cloned().fold(0.0, f64::max) > 0.1);
    }
}
