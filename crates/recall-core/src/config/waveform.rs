//! Waveform display configuration
//!
//! Controls zoom, image height, chunk layout, the band-pass speech filter and
//! playhead smoothing. Resolutions can still change at runtime through the
//! waveform itself; these are the values a newly opened file starts with.

use serde::{Deserialize, Serialize};

use crate::error::{WaveformError, WaveformResult};
use crate::types::{
    FrequencyRange, CHUNK_SECONDS, DEFAULT_AMPLITUDE_RESOLUTION, DEFAULT_MAX_BAND_PASS_HZ,
    DEFAULT_MIN_BAND_PASS_HZ, DEFAULT_OVERLAP_SECONDS, DEFAULT_PIXELS_PER_SECOND, ENVELOPE_WINDOW,
};

/// Highest normalized band edge used when the configured one reaches Nyquist
const HIGHEST_BAND: f64 = 0.4999999;

/// Lowest normalized band edge used when the configured one is not positive
const LOWEST_BAND: f64 = 0.0000001;

/// Playhead smoothing strategy for the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingKind {
    /// Use the reported playhead as is
    None,
    /// Interpolate between playback reports at the observed rate
    LinearInterpolation,
    /// Extrapolate at the nominal rate with gentle drift correction
    #[default]
    PredictiveExtrapolation,
    /// Track position and rate with a phase-locked loop
    PhaseLockedLoop,
}

impl SmoothingKind {
    /// Parse a smoothing name, falling back to predictive extrapolation
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "none" => SmoothingKind::None,
            "linear-interpolation" => SmoothingKind::LinearInterpolation,
            "predictive-extrapolation" => SmoothingKind::PredictiveExtrapolation,
            "phase-locked-loop" => SmoothingKind::PhaseLockedLoop,
            other => {
                log::warn!(
                    "Unknown smoother type: {}, defaulting to predictive-extrapolation",
                    other
                );
                SmoothingKind::PredictiveExtrapolation
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SmoothingKind::None => "none",
            SmoothingKind::LinearInterpolation => "linear-interpolation",
            SmoothingKind::PredictiveExtrapolation => "predictive-extrapolation",
            SmoothingKind::PhaseLockedLoop => "phase-locked-loop",
        }
    }
}

/// Waveform configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Horizontal zoom in pixels per second
    /// Default: 200
    pub time_resolution: u32,

    /// Image height in pixels
    /// Default: 600
    pub amplitude_resolution: u32,

    /// Duration of one rendered chunk
    /// Default: 10.0 seconds
    pub chunk_seconds: f64,

    /// Context loaded before each chunk boundary for the filter to settle
    /// Default: 0.25 seconds
    pub overlap_seconds: f64,

    /// Lower band-pass edge in Hz
    /// Default: 1000 Hz
    pub min_band_pass_hz: f64,

    /// Upper band-pass edge in Hz, corrected down to Nyquist if needed
    /// Default: 16000 Hz
    pub max_band_pass_hz: f64,

    /// Envelope smoothing half-width in samples
    /// Default: 20
    pub envelope_window: usize,

    /// Reuse band-pass filters across chunks
    /// Default: true
    pub filter_cache: bool,

    /// Rendered chunks kept in memory (current + previous + next)
    /// Default: 3
    pub cache_capacity: usize,

    /// Render worker threads, 0 = one less than the number of cores
    /// Default: 0
    pub render_threads: usize,

    /// Playhead smoothing strategy
    /// Default: predictive-extrapolation
    pub smoothing: SmoothingKind,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            time_resolution: DEFAULT_PIXELS_PER_SECOND,
            amplitude_resolution: DEFAULT_AMPLITUDE_RESOLUTION,
            chunk_seconds: CHUNK_SECONDS,
            overlap_seconds: DEFAULT_OVERLAP_SECONDS,
            min_band_pass_hz: DEFAULT_MIN_BAND_PASS_HZ,
            max_band_pass_hz: DEFAULT_MAX_BAND_PASS_HZ,
            envelope_window: ENVELOPE_WINDOW,
            filter_cache: true,
            cache_capacity: 3,
            render_threads: 0,
            smoothing: SmoothingKind::default(),
        }
    }
}

impl WaveformConfig {
    /// Reject values that can never render
    pub fn validate(&self) -> WaveformResult<()> {
        if self.time_resolution == 0 {
            return Err(WaveformError::InvalidResolution(self.time_resolution));
        }
        if self.amplitude_resolution == 0 {
            return Err(WaveformError::InvalidResolution(self.amplitude_resolution));
        }
        if !(self.chunk_seconds > 0.0) {
            return Err(WaveformError::InvalidChunkSize(self.chunk_seconds));
        }
        if !(self.overlap_seconds >= 0.0) {
            return Err(WaveformError::NegativeDuration(self.overlap_seconds));
        }
        if self.envelope_window == 0 {
            return Err(WaveformError::InvalidWindowSize(self.envelope_window));
        }
        if self.cache_capacity == 0 {
            return Err(WaveformError::InvalidConfig(
                "cache_capacity must be >= 1".to_string(),
            ));
        }
        if !(self.min_band_pass_hz < self.max_band_pass_hz) {
            return Err(WaveformError::InvalidConfig(format!(
                "band pass {} Hz - {} Hz is empty",
                self.min_band_pass_hz, self.max_band_pass_hz
            )));
        }
        Ok(())
    }

    /// Pixel width of one chunk at the configured time resolution
    pub fn chunk_width_pixels(&self, time_resolution: u32) -> usize {
        (self.chunk_seconds * time_resolution as f64).round() as usize
    }

    /// Effective worker count for the render pool
    pub fn effective_render_threads(&self) -> usize {
        if self.render_threads > 0 {
            return self.render_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }

    /// Band-pass edges normalized to `sample_rate`
    ///
    /// Edges at or beyond Nyquist, or at or below zero, are pulled just inside
    /// the valid range and a warning is logged.
    pub fn band_pass_range(&self, sample_rate: u32) -> WaveformResult<FrequencyRange> {
        if sample_rate == 0 {
            return Err(WaveformError::InvalidSampleRate(sample_rate as f64));
        }
        let rate = sample_rate as f64;
        let mut min = self.min_band_pass_hz / rate;
        let mut max = self.max_band_pass_hz / rate;

        let mut corrected = false;
        if max >= 0.5 {
            max = HIGHEST_BAND;
            corrected = true;
        }
        if min <= 0.0 {
            min = LOWEST_BAND;
            corrected = true;
        }
        if corrected {
            log::warn!(
                "Band pass {:.0} Hz - {:.0} Hz exceeds what {} Hz audio can represent, filtering {:.0} Hz - {:.0} Hz instead",
                self.min_band_pass_hz,
                self.max_band_pass_hz,
                sample_rate,
                min * rate,
                max * rate
            );
        }

        FrequencyRange::new(min, max)
    }
}
