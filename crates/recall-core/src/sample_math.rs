//! Frame, byte and time conversions
//!
//! Pure arithmetic shared by the audio reader and the renderer. Chunk offsets
//! are always recomputed from the chunk index so they never drift.

use crate::error::{WaveformError, WaveformResult};

/// Lowest sample rate accepted by [`validate_audio_format`]
pub const MIN_SAMPLE_RATE: f64 = 8_000.0;

/// Highest sample rate accepted by [`validate_audio_format`]
pub const MAX_SAMPLE_RATE: f64 = 192_000.0;

fn check_sample_rate(sample_rate: f64) -> WaveformResult<()> {
    if sample_rate > 0.0 && sample_rate.is_finite() {
        Ok(())
    } else {
        Err(WaveformError::InvalidSampleRate(sample_rate))
    }
}

fn check_seconds(seconds: f64) -> WaveformResult<()> {
    if seconds >= 0.0 && seconds.is_finite() {
        Ok(())
    } else {
        Err(WaveformError::NegativeDuration(seconds))
    }
}

/// Convert a frame count to a byte count
pub fn frames_to_bytes(frames: u64, bytes_per_frame: u32) -> WaveformResult<u64> {
    if bytes_per_frame == 0 {
        return Err(WaveformError::InvalidBytesPerFrame(bytes_per_frame));
    }
    Ok(frames * bytes_per_frame as u64)
}

/// Convert seconds to frames, rounding to the nearest frame
pub fn seconds_to_frames(seconds: f64, sample_rate: f64) -> WaveformResult<u64> {
    check_sample_rate(sample_rate)?;
    check_seconds(seconds)?;
    Ok((seconds * sample_rate).round() as u64)
}

/// Convert frames to seconds
pub fn frames_to_seconds(frames: u64, sample_rate: f64) -> WaveformResult<f64> {
    check_sample_rate(sample_rate)?;
    Ok(frames as f64 / sample_rate)
}

/// Byte offset of the start of a chunk
///
/// Computed as `chunk_index * frames_per_chunk` in integer arithmetic, so
/// `chunk_offset(k, ..) == k * chunk_offset(1, ..)` holds exactly.
pub fn chunk_offset(
    chunk_index: u32,
    chunk_seconds: f64,
    sample_rate: f64,
    bytes_per_frame: u32,
) -> WaveformResult<u64> {
    if !(chunk_seconds > 0.0) {
        return Err(WaveformError::InvalidChunkSize(chunk_seconds));
    }
    let frames_per_chunk = seconds_to_frames(chunk_seconds, sample_rate)?;
    frames_to_bytes(chunk_index as u64 * frames_per_chunk, bytes_per_frame)
}

/// Frames of leading context for a given overlap duration
pub fn overlap_frames(overlap_seconds: f64, sample_rate: f64) -> WaveformResult<u64> {
    seconds_to_frames(overlap_seconds, sample_rate)
}

/// Bytes per interleaved frame
///
/// `bits_per_sample` must be a positive multiple of 8.
pub fn bytes_per_frame(channels: u16, bits_per_sample: u16) -> WaveformResult<u32> {
    if channels == 0 {
        return Err(WaveformError::InvalidAudioFormat(format!(
            "channel count must be > 0: {}",
            channels
        )));
    }
    if bits_per_sample == 0 || bits_per_sample % 8 != 0 {
        return Err(WaveformError::InvalidAudioFormat(format!(
            "bits per sample must be a positive multiple of 8: {}",
            bits_per_sample
        )));
    }
    Ok(channels as u32 * (bits_per_sample as u32 / 8))
}

/// Check format parameters for consistency and a sane sample rate range
pub fn validate_audio_format(sample_rate: f64, channels: u16, bits_per_sample: u16) -> WaveformResult<()> {
    check_sample_rate(sample_rate)?;
    bytes_per_frame(channels, bits_per_sample)?;
    if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        return Err(WaveformError::InvalidAudioFormat(format!(
            "sample rate outside typical range (8kHz-192kHz): {}",
            sample_rate
        )));
    }
    Ok(())
}

/// Highest valid chunk number for a file of `total_frames`
///
/// An empty file still has chunk 0, which renders as a flat line.
pub fn last_chunk_number(total_frames: u64, sample_rate: f64, chunk_seconds: f64) -> WaveformResult<u32> {
    if !(chunk_seconds > 0.0) {
        return Err(WaveformError::InvalidChunkSize(chunk_seconds));
    }
    let frames_per_chunk = seconds_to_frames(chunk_seconds, sample_rate)?.max(1);
    if total_frames == 0 {
        return Ok(0);
    }
    Ok(((total_frames - 1) / frames_per_chunk) as u32)
}

/// Chunk containing a given frame
pub fn chunk_for_frame(frame: u64, sample_rate: f64, chunk_seconds: f64) -> WaveformResult<u32> {
    if !(chunk_seconds > 0.0) {
        return Err(WaveformError::InvalidChunkSize(chunk_seconds));
    }
    let frames_per_chunk = seconds_to_frames(chunk_seconds, sample_rate)?.max(1);
    Ok((frame / frames_per_chunk) as u32)
}
