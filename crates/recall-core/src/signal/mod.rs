//! Signal chain for waveform display
//!
//! Raw chunk samples flow through these stages in order:
//!
//! 1. [`bandpass`] - windowed-sinc band-pass over the configured speech band
//! 2. [`enhancer`] - envelope smoothing (sliding maximum of |x|)
//! 3. [`pixel_scaler`] - nearest-sample downsampling plus peak/valley smoothing
//! 4. [`scaler`] - vertical pixel scale from the global rendering peak

pub mod bandpass;
pub mod enhancer;
pub mod pixel_scaler;
pub mod scaler;

pub use bandpass::BandPassFilter;
pub use enhancer::{bandpass_filter, envelope_smooth};
pub use pixel_scaler::{rendering_peak, smooth_pixels, to_pixel_resolution};
pub use scaler::{amplitude_stats, normalize, pixel_scale, AmplitudeStats};
