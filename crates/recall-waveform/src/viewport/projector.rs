//! Viewport projection
//!
//! [`project`] maps audio session state plus the canvas/zoom state to the frame
//! window the painter should show. It is a pure function: equal inputs give
//! an equal [`Projection`], generation included, whatever the wall clock says.
//!
//! [`SmoothedProjector`] puts a [`PlayheadSmoother`] in front of it for live
//! playback. That one is time-dependent on purpose.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use recall_core::config::SmoothingKind;
use recall_core::{WaveformError, WaveformResult};

use super::smoothing::{PlayheadSmoother, SmoothingResult};
use super::{AudioSessionState, PaintMode};

/// What the projector needs to know about the audio session
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSessionSnapshot {
    pub state: AudioSessionState,
    /// Current position (pending start position when not playing)
    pub playhead_frame: u64,
    pub total_frames: u64,
    pub sample_rate: u32,
    /// Set in the error state
    pub error_message: Option<String>,
}

/// Canvas size and zoom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportUiState {
    canvas_width: u32,
    canvas_height: u32,
    frames_per_pixel: f64,
}

impl ViewportUiState {
    pub fn new(canvas_width: u32, canvas_height: u32, frames_per_pixel: f64) -> WaveformResult<Self> {
        if !(frames_per_pixel > 0.0) || !frames_per_pixel.is_finite() {
            return Err(WaveformError::InvalidConfig(format!(
                "frames per pixel must be > 0: {}",
                frames_per_pixel
            )));
        }
        Ok(Self {
            canvas_width,
            canvas_height,
            frames_per_pixel,
        })
    }

    /// Zoom expressed as pixels per second of audio at `sample_rate`
    pub fn from_pixels_per_second(
        canvas_width: u32,
        canvas_height: u32,
        pixels_per_second: u32,
        sample_rate: u32,
    ) -> WaveformResult<Self> {
        if pixels_per_second == 0 {
            return Err(WaveformError::InvalidResolution(pixels_per_second));
        }
        if sample_rate == 0 {
            return Err(WaveformError::InvalidSampleRate(0.0));
        }
        Self::new(
            canvas_width,
            canvas_height,
            sample_rate as f64 / pixels_per_second as f64,
        )
    }

    pub fn canvas_width(&self) -> u32 {
        self.canvas_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.canvas_height
    }

    pub fn frames_per_pixel(&self) -> f64 {
        self.frames_per_pixel
    }

    /// Zoom in pixels per second, at least 1
    pub fn pixels_per_second(&self, sample_rate: u32) -> u32 {
        ((sample_rate as f64 / self.frames_per_pixel).round() as u32).max(1)
    }
}

/// A concrete frame window for painting
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub mode: PaintMode,
    pub playhead_frame: u64,
    /// Window start before clamping; negative near the start of the file
    pub view_start_frame: i64,
    /// Clamped window `[start_frame, end_frame)` within `[0, total_frames]`
    pub start_frame: u64,
    pub end_frame: u64,
    /// Empty columns left of frame 0 that keep the playhead centred
    pub left_pad_pixels: u32,
    pub pixels_per_frame: f64,
    /// Identity of this projection for repaint deduplication
    pub generation: u64,
    pub error_message: Option<String>,
}

impl Projection {
    fn without_window(mode: PaintMode, audio: &AudioSessionSnapshot) -> Self {
        let mut projection = Self {
            mode,
            playhead_frame: 0,
            view_start_frame: 0,
            start_frame: 0,
            end_frame: 0,
            left_pad_pixels: 0,
            pixels_per_frame: 0.0,
            generation: 0,
            error_message: audio.error_message.clone(),
        };
        projection.generation = projection.identity();
        projection
    }

    /// Frames covered by the clamped window
    pub fn frame_count(&self) -> u64 {
        self.end_frame - self.start_frame
    }

    fn identity(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.mode.hash(&mut hasher);
        self.playhead_frame.hash(&mut hasher);
        self.view_start_frame.hash(&mut hasher);
        self.start_frame.hash(&mut hasher);
        self.end_frame.hash(&mut hasher);
        self.left_pad_pixels.hash(&mut hasher);
        self.pixels_per_frame.to_bits().hash(&mut hasher);
        self.error_message.hash(&mut hasher);
        hasher.finish()
    }
}

/// Map audio state to paint mode
pub fn paint_mode(state: AudioSessionState) -> PaintMode {
    match state {
        AudioSessionState::NoAudio => PaintMode::Empty,
        AudioSessionState::Loading => PaintMode::Loading,
        AudioSessionState::Error => PaintMode::Error,
        AudioSessionState::Ready | AudioSessionState::Playing | AudioSessionState::Paused => {
            PaintMode::Render
        }
    }
}

/// Project audio and UI state to a frame window centred on the playhead
pub fn project(audio: &AudioSessionSnapshot, ui: &ViewportUiState) -> Projection {
    let mode = paint_mode(audio.state);
    if mode != PaintMode::Render {
        return Projection::without_window(mode, audio);
    }

    let playhead = audio.playhead_frame.min(audio.total_frames);
    let width_frames = ((ui.canvas_width as f64 * ui.frames_per_pixel).round() as i64).max(1);
    let view_start = playhead as i64 - width_frames / 2;
    let view_end = view_start + width_frames;

    let start_frame = view_start.max(0) as u64;
    let end_frame = (view_end.max(0) as u64).min(audio.total_frames).max(start_frame);
    let pixels_per_frame = 1.0 / ui.frames_per_pixel;
    let left_pad_pixels = if view_start < 0 {
        (((-view_start) as f64) * pixels_per_frame).round() as u32
    } else {
        0
    };

    let mut projection = Projection {
        mode,
        playhead_frame: playhead,
        view_start_frame: view_start,
        start_frame,
        end_frame,
        left_pad_pixels,
        pixels_per_frame,
        generation: 0,
        error_message: audio.error_message.clone(),
    };
    projection.generation = projection.identity();
    projection
}

/// Projector with playhead smoothing in front
///
/// Time-dependent: the smoothed playhead depends on how much time passed
/// between calls.
pub struct SmoothedProjector {
    state: Mutex<SmootherClock>,
}

struct SmootherClock {
    smoother: PlayheadSmoother,
    last_update: Option<Instant>,
}

impl SmoothedProjector {
    pub fn new(kind: SmoothingKind, sample_rate: u32) -> Self {
        log::info!("[VIEWPORT] Waveform smoother: {}", kind.name());
        Self {
            state: Mutex::new(SmootherClock {
                smoother: PlayheadSmoother::new(kind, sample_rate),
                last_update: None,
            }),
        }
    }

    pub fn kind(&self) -> SmoothingKind {
        self.lock().smoother.kind()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SmootherClock> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Project using wall-clock time since the previous call
    pub fn project(&self, audio: &AudioSessionSnapshot, ui: &ViewportUiState) -> Projection {
        let now = Instant::now();
        let elapsed = {
            let mut clock = self.lock();
            let elapsed = clock
                .last_update
                .map(|last| now.duration_since(last))
                .unwrap_or(Duration::ZERO);
            clock.last_update = Some(now);
            elapsed
        };
        self.project_after(audio, ui, elapsed)
    }

    /// Project as if `elapsed` passed since the previous call
    pub fn project_after(
        &self,
        audio: &AudioSessionSnapshot,
        ui: &ViewportUiState,
        elapsed: Duration,
    ) -> Projection {
        let mut clock = self.lock();
        if paint_mode(audio.state) != PaintMode::Render {
            clock.smoother.reset();
            return project(audio, ui);
        }

        let SmoothingResult { smoothed_frame, .. } = clock.smoother.update(
            audio.playhead_frame as i64,
            elapsed,
            audio.state == AudioSessionState::Playing,
        );
        drop(clock);

        let smoothed = AudioSessionSnapshot {
            playhead_frame: smoothed_frame.clamp(0, audio.total_frames as i64) as u64,
            ..audio.clone()
        };
        project(&smoothed, ui)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: AudioSessionState, playhead: u64) -> AudioSessionSnapshot {
        AudioSessionSnapshot {
            state,
            playhead_frame: playhead,
            total_frames: 441_000,
            sample_rate: 44_100,
            error_message: None,
        }
    }

    fn ui() -> ViewportUiState {
        // 1000 px at 100 px/s = 10 s = 441000 frames
        ViewportUiState::from_pixels_per_second(1000, 200, 100, 44_100).unwrap()
    }

    #[test]
    fn test_paint_modes() {
        assert_eq!(paint_mode(AudioSessionState::NoAudio), PaintMode::Empty);
        assert_eq!(paint_mode(AudioSessionState::Loading), PaintMode::Loading);
        assert_eq!(paint_mode(AudioSessionState::Error), PaintMode::Error);
        for state in [
            AudioSessionState::Ready,
            AudioSessionState::Playing,
            AudioSessionState::Paused,
        ] {
            assert_eq!(paint_mode(state), PaintMode::Render);
        }
    }

    #[test]
    fn test_window_centred_on_playhead() {
        let p = project(&snapshot(AudioSessionState::Paused, 220_500), &ui());
        assert_eq!(p.mode, PaintMode::Render);
        assert_eq!(p.view_start_frame, 0);
        assert_eq!(p.start_frame, 0);
        assert_eq!(p.end_frame, 441_000);
        assert_eq!(p.left_pad_pixels, 0);
        assert!((p.pixels_per_frame - 100.0 / 44_100.0).abs() < 1e-12);
    }

    #[test]
    fn test_window_clamped_at_start() {
        let p = project(&snapshot(AudioSessionState::Ready, 0), &ui());
        assert_eq!(p.view_start_frame, -220_500);
        assert_eq!(p.start_frame, 0);
        assert_eq!(p.end_frame, 220_500);
        assert_eq!(p.left_pad_pixels, 500);
    }

    #[test]
    fn test_window_clamped_at_end() {
        let p = project(&snapshot(AudioSessionState::Playing, 441_000), &ui());
        assert_eq!(p.start_frame, 220_500);
        assert_eq!(p.end_frame, 441_000);
        assert_eq!(p.frame_count(), 220_500);
    }

    #[test]
    fn test_projection_is_referentially_transparent() {
        let audio = snapshot(AudioSessionState::Playing, 123_456);
        let a = project(&audio, &ui());
        std::thread::sleep(Duration::from_millis(5));
        let b = project(&audio, &ui());
        assert_eq!(a, b);

        let moved = project(&snapshot(AudioSessionState::Playing, 123_457), &ui());
        assert_ne!(a.generation, moved.generation);
    }

    #[test]
    fn test_non_render_modes_have_no_window() {
        let mut audio = snapshot(AudioSessionState::Error, 1000);
        audio.error_message = Some("decoder failed".to_string());
        let p = project(&audio, &ui());
        assert_eq!(p.mode, PaintMode::Error);
        assert_eq!(p.frame_count(), 0);
        assert_eq!(p.error_message.as_deref(), Some("decoder failed"));

        let empty = project(&snapshot(AudioSessionState::NoAudio, 1000), &ui());
        assert_eq!(empty.mode, PaintMode::Empty);
        assert_ne!(empty.generation, p.generation);
    }

    #[test]
    fn test_ui_state_validation() {
        assert!(ViewportUiState::new(100, 100, 0.0).is_err());
        assert!(ViewportUiState::new(100, 100, f64::NAN).is_err());
        assert!(ViewportUiState::from_pixels_per_second(100, 100, 0, 44_100).is_err());
        assert_eq!(ui().pixels_per_second(44_100), 100);
    }

    #[test]
    fn test_smoothed_projector_without_smoothing_matches_pure() {
        let projector = SmoothedProjector::new(SmoothingKind::None, 44_100);
        let audio = snapshot(AudioSessionState::Playing, 300_000);
        let smoothed = projector.project_after(&audio, &ui(), Duration::from_millis(16));
        assert_eq!(smoothed, project(&audio, &ui()));
    }

    #[test]
    fn test_smoothed_projector_lags_new_reports() {
        let projector = SmoothedProjector::new(SmoothingKind::LinearInterpolation, 44_100);
        let paused = snapshot(AudioSessionState::Paused, 100_000);
        projector.project_after(&paused, &ui(), Duration::ZERO);

        let playing = snapshot(AudioSessionState::Playing, 100_441);
        let p = projector.project_after(&playing, &ui(), Duration::from_millis(10));
        assert_eq!(p.playhead_frame, 100_000);
    }
}
