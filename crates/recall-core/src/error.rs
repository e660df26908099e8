//! Error types for the waveform pipeline
//!
//! These are precondition violations: a caller passed a value that can never
//! produce a sensible waveform. They are reported immediately instead of being
//! clamped, since they point at a bug in the caller rather than bad audio data.

use thiserror::Error;

/// Errors raised by sample math, signal processing and waveform configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaveformError {
    /// Sample rate was zero, negative or not finite
    #[error("Sample rate must be > 0: {0}")]
    InvalidSampleRate(f64),

    /// Bytes per frame was zero
    #[error("Bytes per frame must be > 0: {0}")]
    InvalidBytesPerFrame(u32),

    /// A duration in seconds was negative or not finite
    #[error("Duration cannot be negative: {0}s")]
    NegativeDuration(f64),

    /// Chunk size was zero or negative
    #[error("Chunk size must be > 0: {0}s")]
    InvalidChunkSize(f64),

    /// Channel count or bit depth unusable
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),

    /// Target pixel width was zero
    #[error("Target pixel width must be > 0: {0}")]
    InvalidPixelWidth(usize),

    /// Skip count outside `[0, len)`
    #[error("Invalid skip count {skip} for {len} samples")]
    InvalidSkip { skip: usize, len: usize },

    /// Frequency range outside `[0, 0.5]` or empty
    #[error("Invalid frequency range: {min}..{max} (normalized, must satisfy 0 <= min < max <= 0.5)")]
    InvalidFrequencyRange { min: f64, max: f64 },

    /// Envelope window smaller than one sample
    #[error("Window size must be >= 1: {0}")]
    InvalidWindowSize(usize),

    /// Display height was zero
    #[error("Display height must be > 0: {0}")]
    InvalidDisplayHeight(u32),

    /// Time or amplitude resolution was zero
    #[error("Resolution must be > 0: {0}")]
    InvalidResolution(u32),

    /// Target peak for normalization was zero or negative
    #[error("Target peak must be > 0: {0}")]
    InvalidTargetPeak(f64),

    /// Chunk number beyond the end of the file
    #[error("Chunk {chunk} out of range (last chunk is {last})")]
    ChunkOutOfRange { chunk: u32, last: u32 },

    /// The audio backend could not describe or read the file
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    /// Operation needs an open audio file
    #[error("No audio loaded")]
    NoAudioLoaded,

    /// A configuration value failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for waveform pipeline operations
pub type WaveformResult<T> = Result<T, WaveformError>;
