//! Audio access for waveform rendering
//!
//! The renderer never decodes audio itself; it asks an [`AudioSource`] for one
//! chunk at a time. [`WavAudioSource`] is the built-in implementation for
//! PCM/float WAV files, other backends only need to implement the trait.
//!
//! ## Chunk layout
//!
//! ```text
//!            overlap            chunk_seconds
//!         |<-------->|<----------------------------->|
//! ...-----+----------+-------------------------------+-----...
//!         ^          ^ chunk_index * frames_per_chunk
//!         read start
//! ```
//!
//! Chunk 0 has no overlap. Samples are downmixed to mono and scaled to [-1, 1].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;

use crate::sample_math;
use crate::types::AudioChunkData;

/// Errors reading audio for the waveform
#[derive(Error, Debug)]
pub enum AudioReadError {
    /// File missing or unreadable
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV container or sample decoding failed
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),

    /// Bit depth / sample format combination not supported
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Chunk parameters were invalid
    #[error("Invalid chunk request: {0}")]
    InvalidRequest(String),
}

/// Result type for audio reads
pub type AudioReadResult<T> = Result<T, AudioReadError>;

/// Basic facts about an audio file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioMetadata {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Length in frames
    pub total_frames: u64,
}

impl AudioMetadata {
    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.sample_rate as f64
    }
}

/// Source of raw chunk samples
///
/// Implementations must be callable from several render threads at once.
pub trait AudioSource: Send + Sync {
    /// Read chunk `chunk_index` plus up to `overlap_seconds` of leading context
    ///
    /// The returned [`AudioChunkData`] reports the frames actually read
    /// (overlap included) and how many of them are overlap.
    fn read_chunk(
        &self,
        path: &Path,
        chunk_index: u32,
        chunk_seconds: f64,
        overlap_seconds: f64,
    ) -> AudioReadResult<AudioChunkData>;

    /// Sample rate, channel count and length of the file
    fn metadata(&self, path: &Path) -> AudioReadResult<AudioMetadata>;
}

/// [`AudioSource`] backed by `hound`
///
/// Opens the file per request, so concurrent reads never share a decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavAudioSource;

impl WavAudioSource {
    pub fn new() -> Self {
        Self
    }

    fn open(path: &Path) -> AudioReadResult<WavReader<BufReader<File>>> {
        Ok(WavReader::open(path)?)
    }
}

impl AudioSource for WavAudioSource {
    fn read_chunk(
        &self,
        path: &Path,
        chunk_index: u32,
        chunk_seconds: f64,
        overlap_seconds: f64,
    ) -> AudioReadResult<AudioChunkData> {
        let mut reader = Self::open(path)?;
        let spec = reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels.max(1) as usize;
        let total_frames = reader.duration() as u64;

        let invalid = |e: crate::error::WaveformError| AudioReadError::InvalidRequest(e.to_string());
        if !(chunk_seconds > 0.0) {
            return Err(AudioReadError::InvalidRequest(format!(
                "chunk size must be > 0: {}",
                chunk_seconds
            )));
        }
        let frames_per_chunk = sample_math::seconds_to_frames(chunk_seconds, sample_rate as f64).map_err(invalid)?;
        let wanted_overlap = if chunk_index > 0 {
            sample_math::overlap_frames(overlap_seconds, sample_rate as f64).map_err(invalid)?
        } else {
            0
        };

        let chunk_start = chunk_index as u64 * frames_per_chunk;
        let read_start = chunk_start.saturating_sub(wanted_overlap);
        let overlap_frames = (chunk_start - read_start) as usize;

        if read_start >= total_frames {
            log::debug!(
                "read_chunk: chunk {} starts past end of {:?} ({} frames)",
                chunk_index,
                path,
                total_frames
            );
            return Ok(AudioChunkData::new(Vec::new(), sample_rate, 0, 0));
        }

        let frames_wanted = (frames_per_chunk + overlap_frames as u64).min(total_frames - read_start) as usize;
        reader.seek(read_start as u32)?;

        let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .take(frames_wanted * channels)
                .map(|s| s.map(|v| v as f64))
                .collect::<Result<_, _>>()?,
            (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
                let full_scale = (1u64 << (bits - 1)) as f64;
                reader
                    .samples::<i32>()
                    .take(frames_wanted * channels)
                    .map(|s| s.map(|v| v as f64 / full_scale))
                    .collect::<Result<_, _>>()?
            }
            (format, bits) => {
                return Err(AudioReadError::UnsupportedFormat(format!(
                    "{:?} at {} bits",
                    format, bits
                )));
            }
        };

        let samples: Vec<f64> = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f64>() / channels as f64)
            .collect();
        let frame_count = samples.len();

        log::trace!(
            "read_chunk: {:?} chunk {} -> {} frames ({} overlap) at {} Hz",
            path,
            chunk_index,
            frame_count,
            overlap_frames,
            sample_rate
        );

        Ok(AudioChunkData::new(
            samples,
            sample_rate,
            frame_count,
            overlap_frames.min(frame_count),
        ))
    }

    fn metadata(&self, path: &Path) -> AudioReadResult<AudioMetadata> {
        let reader = Self::open(path)?;
        let spec = reader.spec();
        Ok(AudioMetadata {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            total_frames: reader.duration() as u64,
        })
    }
}
