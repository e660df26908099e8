//! Viewport layer: projection, playhead smoothing and session management
//!
//! The painter lives outside this crate. It feeds canvas size, zoom and the
//! audio session state in, and gets back a frame window plus the composited
//! waveform image for that window.

mod projector;
mod session;
mod smoothing;

pub use projector::{
    paint_mode, project, AudioSessionSnapshot, Projection, SmoothedProjector, ViewportUiState,
};
pub use session::{
    AudioEngine, PlaybackListener, PlaybackState, RecordedEvent, RenderSpec, ViewportContext,
    ViewportEvent, ViewportPlaybackListener, ViewportSession, ViewportSessionManager,
    ZoomDirection, MAX_EVENT_HISTORY, MAX_PIXELS_PER_SECOND, MIN_PIXELS_PER_SECOND, ZOOM_FACTOR,
};
pub use smoothing::{PlayheadSmoother, SmoothingResult};

/// High-level audio session state, as reported by the audio layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSessionState {
    NoAudio,
    Loading,
    Ready,
    Playing,
    Paused,
    Error,
}

/// What the painter should draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaintMode {
    /// No file open
    Empty,
    /// File still opening
    Loading,
    /// Opening or playback failed
    Error,
    /// Draw the waveform window
    Render,
}
