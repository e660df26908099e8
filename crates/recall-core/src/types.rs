//! Common types for the recall waveform pipeline
//!
//! Value types shared by the signal chain and the renderer, plus the
//! constants that fix the chunk layout of a rendered waveform.

use std::hash::{Hash, Hasher};

use crate::error::{WaveformError, WaveformResult};

/// Duration of one rendered chunk in seconds
pub const CHUNK_SECONDS: f64 = 10.0;

/// Audio context loaded before each chunk boundary so the band-pass filter
/// has settled by the time the visible region starts
pub const DEFAULT_OVERLAP_SECONDS: f64 = 0.25;

/// Default horizontal zoom in pixels per second
pub const DEFAULT_PIXELS_PER_SECOND: u32 = 200;

/// Default waveform image height in pixels
pub const DEFAULT_AMPLITUDE_RESOLUTION: u32 = 600;

/// Half-width of the envelope smoothing window in samples
pub const ENVELOPE_WINDOW: usize = 20;

/// Band-pass defaults in Hz (speech band)
pub const DEFAULT_MIN_BAND_PASS_HZ: f64 = 1000.0;
pub const DEFAULT_MAX_BAND_PASS_HZ: f64 = 16000.0;

/// Raw or processed samples of one chunk
///
/// Built fresh for every chunk load and consumed within one processing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunkData {
    /// Mono amplitude values in [-1, 1], overlap region first
    pub samples: Vec<f64>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Peak amplitude, filled in after processing (0.0 until then)
    pub peak: f64,
    /// Frames actually read, including the overlap region
    pub frame_count: usize,
    /// Leading context frames before the chunk boundary
    pub overlap_frames: usize,
}

impl AudioChunkData {
    pub fn new(samples: Vec<f64>, sample_rate: u32, frame_count: usize, overlap_frames: usize) -> Self {
        Self {
            samples,
            sample_rate,
            peak: 0.0,
            frame_count,
            overlap_frames,
        }
    }

    /// Replace the sample buffer, keeping the chunk layout
    pub fn with_samples(&self, samples: Vec<f64>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
            peak: self.peak,
            frame_count: self.frame_count,
            overlap_frames: self.overlap_frames,
        }
    }

    /// True when nothing past the overlap region was read
    pub fn is_empty(&self) -> bool {
        self.samples.len() <= self.overlap_frames
    }
}

/// Normalized band-pass range (0.0 - 0.5, fraction of the sample rate)
///
/// Used as the key of the processor's filter cache, so equality and hashing
/// compare the exact bit patterns of both bounds. `-0.0` is folded into `0.0`.
#[derive(Debug, Clone, Copy)]
pub struct FrequencyRange {
    min: f64,
    max: f64,
}

impl FrequencyRange {
    /// Create a validated range
    ///
    /// Rejects `min < 0`, `max > 0.5`, `min >= max` and NaN bounds.
    pub fn new(min: f64, max: f64) -> WaveformResult<Self> {
        if !(min >= 0.0 && max <= 0.5 && min < max) {
            return Err(WaveformError::InvalidFrequencyRange { min, max });
        }
        Ok(Self {
            min: min + 0.0,
            max: max + 0.0,
        })
    }

    pub fn min_frequency(&self) -> f64 {
        self.min
    }

    pub fn max_frequency(&self) -> f64 {
        self.max
    }
}

impl PartialEq for FrequencyRange {
    fn eq(&self, other: &Self) -> bool {
        self.min.to_bits() == other.min.to_bits() && self.max.to_bits() == other.max.to_bits()
    }
}

impl Eq for FrequencyRange {}

impl Hash for FrequencyRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min.to_bits().hash(state);
        self.max.to_bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_frequency_range_validation() {
        assert!(FrequencyRange::new(0.001, 0.45).is_ok());
        assert!(FrequencyRange::new(0.0, 0.5).is_ok());
        assert!(FrequencyRange::new(-0.1, 0.3).is_err());
        assert!(FrequencyRange::new(0.1, 0.6).is_err());
        assert!(FrequencyRange::new(0.3, 0.3).is_err());
        assert!(FrequencyRange::new(0.4, 0.2).is_err());
        assert!(FrequencyRange::new(f64::NAN, 0.2).is_err());
    }

    #[test]
    fn test_frequency_range_hash_equality() {
        let mut set = HashSet::new();
        set.insert(FrequencyRange::new(0.001, 0.45).unwrap());
        set.insert(FrequencyRange::new(0.001, 0.45).unwrap());
        set.insert(FrequencyRange::new(0.002, 0.45).unwrap());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_negative_zero_folds_into_zero() {
        let a = FrequencyRange::new(-0.0, 0.25).unwrap();
        let b = FrequencyRange::new(0.0, 0.25).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunk_data_empty_when_only_overlap() {
        let chunk = AudioChunkData::new(vec![0.1; 10], 8000, 10, 10);
        assert!(chunk.is_empty());
        let chunk = AudioChunkData::new(vec![0.1; 11], 8000, 11, 10);
        assert!(!chunk.is_empty());
    }
}
