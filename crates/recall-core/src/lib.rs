//! Recall Core - sample math, signal processing and audio access
//!
//! Everything here is free of rendering concerns: the waveform crate pulls raw
//! samples through [`audio_file::AudioSource`], runs them through [`signal`] and
//! rasterizes the result itself.

pub mod audio_file;
pub mod config;
pub mod error;
pub mod sample_math;
pub mod signal;
pub mod types;

pub use error::{WaveformError, WaveformResult};
pub use types::*;
