//! Configuration for the waveform pipeline
//!
//! - `waveform.yaml` loading (validated, defaults on any problem) and saving
//! - Config path utilities
//! - [`WaveformConfig`]: resolutions, band-pass, chunk layout and smoothing
//!
//! # Usage
//!
//! ```ignore
//! use recall_core::config::{default_config_path, load_config, WaveformConfig};
//!
//! let config: WaveformConfig = load_config(&default_config_path("waveform.yaml"));
//! ```

mod io;
mod paths;
mod waveform;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use waveform::{SmoothingKind, WaveformConfig};
