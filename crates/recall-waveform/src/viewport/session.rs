//! Viewport state and per-file viewport sessions
//!
//! [`ViewportSessionManager`] owns the current [`ViewportContext`] (playhead,
//! zoom, canvas size). Every change goes through a [`ViewportEvent`], is
//! recorded in a short history for debugging, and is published by swapping
//! the context atomically, so the painter always reads a consistent context
//! without taking a lock.
//!
//! A [`ViewportSession`] exists while a file is open. It registers a playback
//! listener with the audio engine so progress reports move the viewport, and
//! on disposal removes the listener and closes the file's waveform.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use arc_swap::ArcSwap;
use image::RgbImage;

use recall_core::config::SmoothingKind;
use recall_core::{WaveformError, WaveformResult};

use super::projector::{AudioSessionSnapshot, Projection, SmoothedProjector, ViewportUiState};
use super::{AudioSessionState, PaintMode};
use crate::waveform::Waveform;

/// Events kept for [`ViewportSessionManager::event_history`]
pub const MAX_EVENT_HISTORY: usize = 100;

/// Zoom step for one zoom in/out action
pub const ZOOM_FACTOR: f64 = 1.5;

/// Zoom limits in pixels per second
pub const MIN_PIXELS_PER_SECOND: u32 = 50;
pub const MAX_PIXELS_PER_SECOND: u32 = 800;

// ────────────────────────────────────────────────────────────────────────────────
// Context and events
// ────────────────────────────────────────────────────────────────────────────────

/// What the viewport shows: the playhead sits at the centre of the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportContext {
    /// Time at the centre of the canvas
    pub playhead_seconds: f64,
    /// Zoom level
    pub pixels_per_second: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for ViewportContext {
    fn default() -> Self {
        Self {
            playhead_seconds: 0.0,
            pixels_per_second: 200,
            canvas_width: 1000,
            canvas_height: 200,
        }
    }
}

impl ViewportContext {
    pub fn new(
        playhead_seconds: f64,
        pixels_per_second: u32,
        canvas_width: u32,
        canvas_height: u32,
    ) -> WaveformResult<Self> {
        if !(playhead_seconds >= 0.0) || !playhead_seconds.is_finite() {
            return Err(WaveformError::NegativeDuration(playhead_seconds));
        }
        if pixels_per_second == 0 {
            return Err(WaveformError::InvalidResolution(pixels_per_second));
        }
        Ok(Self {
            playhead_seconds,
            pixels_per_second,
            canvas_width,
            canvas_height,
        })
    }

    /// Seconds of audio across the canvas
    pub fn width_seconds(&self) -> f64 {
        self.canvas_width as f64 / self.pixels_per_second as f64
    }

    /// Time at the left edge (negative near the start of the file)
    pub fn start_time(&self) -> f64 {
        self.playhead_seconds - self.width_seconds() / 2.0
    }

    /// Time at the right edge
    pub fn end_time(&self) -> f64 {
        self.playhead_seconds + self.width_seconds() / 2.0
    }

    /// Visible time range clipped to the start of the file
    pub fn time_range(&self) -> (f64, f64) {
        (self.start_time().max(0.0), self.end_time().max(0.001))
    }
}

/// A change to the viewport context
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    PlaybackUpdate { playhead_seconds: f64 },
    UserZoom { pixels_per_second: u32 },
    UserSeek { target_seconds: f64 },
    CanvasResize { width: u32, height: u32 },
}

impl ViewportEvent {
    fn apply(&self, ctx: &ViewportContext) -> ViewportContext {
        match *self {
            ViewportEvent::PlaybackUpdate { playhead_seconds } => ViewportContext {
                playhead_seconds: playhead_seconds.max(0.0),
                ..*ctx
            },
            ViewportEvent::UserZoom { pixels_per_second } => ViewportContext {
                pixels_per_second,
                ..*ctx
            },
            ViewportEvent::UserSeek { target_seconds } => ViewportContext {
                playhead_seconds: target_seconds.max(0.0),
                ..*ctx
            },
            ViewportEvent::CanvasResize { width, height } => ViewportContext {
                canvas_width: width,
                canvas_height: height,
                ..*ctx
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewportEvent::PlaybackUpdate { .. } => "PlaybackUpdate",
            ViewportEvent::UserZoom { .. } => "UserZoom",
            ViewportEvent::UserSeek { .. } => "UserSeek",
            ViewportEvent::CanvasResize { .. } => "CanvasResize",
        }
    }

    fn details(&self) -> String {
        match self {
            ViewportEvent::PlaybackUpdate { playhead_seconds } => {
                format!("playhead={:.2}s", playhead_seconds)
            }
            ViewportEvent::UserZoom { pixels_per_second } => format!("zoom={}px/s", pixels_per_second),
            ViewportEvent::UserSeek { target_seconds } => format!("seek={:.2}s", target_seconds),
            ViewportEvent::CanvasResize { width, height } => format!("size={}x{}", width, height),
        }
    }
}

/// An applied event with when and where it came from
#[derive(Debug, Clone, Copy)]
pub struct RecordedEvent {
    pub at: Instant,
    pub source: &'static str,
    pub event: ViewportEvent,
}

/// Context plus history, shared with the playback listener
struct ViewportState {
    context: ArcSwap<ViewportContext>,
    history: Mutex<VecDeque<RecordedEvent>>,
}

impl ViewportState {
    fn new() -> Self {
        Self {
            context: ArcSwap::from_pointee(ViewportContext::default()),
            history: Mutex::new(VecDeque::with_capacity(MAX_EVENT_HISTORY)),
        }
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<RecordedEvent>> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn context(&self) -> ViewportContext {
        **self.context.load()
    }

    fn apply(&self, source: &'static str, event: ViewportEvent) {
        {
            let mut history = self.history();
            history.push_back(RecordedEvent {
                at: Instant::now(),
                source,
                event,
            });
            while history.len() > MAX_EVENT_HISTORY {
                history.pop_front();
            }
        }

        self.context.rcu(|ctx| event.apply(ctx));

        if log::log_enabled!(log::Level::Debug) {
            let ctx = self.context();
            log::debug!(
                "[VIEWPORT] {} -> playhead={:.2}s, start={:.2}s, end={:.2}s",
                event.name(),
                ctx.playhead_seconds,
                ctx.start_time(),
                ctx.end_time()
            );
        }
    }

    /// Apply a zoom level, clamped to the supported range
    fn user_zoom(&self, pixels_per_second: u32) {
        if pixels_per_second == 0 {
            log::warn!("[VIEWPORT] Invalid zoom level: {} pixels per second", pixels_per_second);
            return;
        }
        let clamped = pixels_per_second.clamp(MIN_PIXELS_PER_SECOND, MAX_PIXELS_PER_SECOND);
        if clamped != pixels_per_second {
            log::debug!(
                "[VIEWPORT] Zoom {} px/s clamped to {} px/s",
                pixels_per_second,
                clamped
            );
        }
        self.apply(
            "USER_ZOOM",
            ViewportEvent::UserZoom {
                pixels_per_second: clamped,
            },
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Audio engine boundary
// ────────────────────────────────────────────────────────────────────────────────

/// Playback state reported by the audio engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Finished,
}

/// Receives playback callbacks, usually on the audio engine's thread
pub trait PlaybackListener: Send + Sync {
    fn on_progress(&self, position_frames: u64, total_frames: u64);
    fn on_state_changed(&self, new_state: PlaybackState, old_state: PlaybackState);
}

/// The part of the audio engine the viewport needs
pub trait AudioEngine: Send + Sync {
    fn add_playback_listener(&self, listener: Arc<dyn PlaybackListener>);
    fn remove_playback_listener(&self, listener: &Arc<dyn PlaybackListener>);
}

/// Moves the viewport along with playback progress
pub struct ViewportPlaybackListener {
    state: Arc<ViewportState>,
    sample_rate: u32,
    position_frames: AtomicU64,
    playing: AtomicBool,
}

impl ViewportPlaybackListener {
    fn new(state: Arc<ViewportState>, sample_rate: u32) -> Self {
        Self {
            state,
            sample_rate: sample_rate.max(1),
            position_frames: AtomicU64::new(0),
            playing: AtomicBool::new(false),
        }
    }

    pub fn playback_position_seconds(&self) -> f64 {
        self.position_frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }
}

impl PlaybackListener for ViewportPlaybackListener {
    fn on_progress(&self, position_frames: u64, _total_frames: u64) {
        self.position_frames.store(position_frames, Ordering::Release);
        if self.is_playing() {
            let playhead_seconds = position_frames as f64 / self.sample_rate as f64;
            self.state
                .apply("PLAYBACK", ViewportEvent::PlaybackUpdate { playhead_seconds });
        }
    }

    fn on_state_changed(&self, new_state: PlaybackState, old_state: PlaybackState) {
        self.playing
            .store(new_state == PlaybackState::Playing, Ordering::Release);

        if matches!(new_state, PlaybackState::Stopped | PlaybackState::Finished) {
            self.position_frames.store(0, Ordering::Release);
            self.state.apply(
                "PLAYBACK",
                ViewportEvent::PlaybackUpdate {
                    playhead_seconds: 0.0,
                },
            );
        }

        log::debug!(
            "[VIEWPORT] Playback state changed: {:?} -> {:?}, playing: {}",
            old_state,
            new_state,
            self.is_playing()
        );
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

/// Viewport bookkeeping for one open file
pub struct ViewportSession {
    state: Arc<ViewportState>,
    sample_rate: u32,
    listener: Arc<ViewportPlaybackListener>,
    /// Same listener as registered with the engine, needed to remove it again
    registration: Arc<dyn PlaybackListener>,
    waveform: Arc<Waveform>,
    projector: SmoothedProjector,
}

impl ViewportSession {
    fn new(
        engine: &dyn AudioEngine,
        state: Arc<ViewportState>,
        waveform: Arc<Waveform>,
        smoothing: SmoothingKind,
    ) -> Self {
        let sample_rate = waveform.metadata().sample_rate;
        let listener = Arc::new(ViewportPlaybackListener::new(state.clone(), sample_rate));
        let registration: Arc<dyn PlaybackListener> = listener.clone();
        engine.add_playback_listener(registration.clone());

        Self {
            state,
            sample_rate,
            listener,
            registration,
            waveform,
            projector: SmoothedProjector::new(smoothing, sample_rate),
        }
    }

    /// Zoom by [`ZOOM_FACTOR`] around the playhead
    ///
    /// Stops at [`MIN_PIXELS_PER_SECOND`] and [`MAX_PIXELS_PER_SECOND`].
    pub fn zoom(&self, direction: ZoomDirection) {
        let current = self.state.context().pixels_per_second as f64;
        let zoomed = match direction {
            ZoomDirection::In => current * ZOOM_FACTOR,
            ZoomDirection::Out => current / ZOOM_FACTOR,
        };
        self.state.user_zoom(zoomed as u32);
    }

    /// Move the playhead to `frame`
    pub fn seek(&self, frame: u64) {
        let target_seconds = frame as f64 / self.sample_rate as f64;
        self.state
            .apply("USER_SEEK", ViewportEvent::UserSeek { target_seconds });
    }

    pub fn update_playback_position(&self, playhead_seconds: f64) {
        self.state
            .apply("PLAYBACK", ViewportEvent::PlaybackUpdate { playhead_seconds });
    }

    pub fn update_canvas_size(&self, width: u32, height: u32) {
        self.state
            .apply("CANVAS", ViewportEvent::CanvasResize { width, height });
    }

    pub fn viewport_context(&self) -> ViewportContext {
        self.state.context()
    }

    pub fn playback_position_seconds(&self) -> f64 {
        self.listener.playback_position_seconds()
    }

    pub fn is_playing(&self) -> bool {
        self.listener.is_playing()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn waveform(&self) -> &Arc<Waveform> {
        &self.waveform
    }

    pub fn playback_listener(&self) -> &Arc<ViewportPlaybackListener> {
        &self.listener
    }

    /// Unregister from the engine and stop rendering this file
    fn dispose(&self, engine: &dyn AudioEngine) {
        engine.remove_playback_listener(&self.registration);
        self.waveform.close();
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Manager
// ────────────────────────────────────────────────────────────────────────────────

/// Everything the painter needs for one repaint
pub struct RenderSpec {
    pub mode: PaintMode,
    pub error_message: Option<String>,
    /// Composited waveform for the window, present in [`PaintMode::Render`]
    pub image: Option<RgbImage>,
    pub projection: Projection,
    pub generation: u64,
    /// Changes whenever the painted result would change
    pub spec_id: String,
}

#[derive(Debug, Clone)]
struct AudioStatus {
    state: AudioSessionState,
    error_message: Option<String>,
}

/// Owns the viewport context and the session of the open file
pub struct ViewportSessionManager {
    engine: Arc<dyn AudioEngine>,
    state: Arc<ViewportState>,
    smoothing: SmoothingKind,
    audio: ArcSwap<AudioStatus>,
    session: Mutex<Option<Arc<ViewportSession>>>,
}

impl ViewportSessionManager {
    pub fn new(engine: Arc<dyn AudioEngine>, smoothing: SmoothingKind) -> Self {
        Self {
            engine,
            state: Arc::new(ViewportState::new()),
            smoothing,
            audio: ArcSwap::from_pointee(AudioStatus {
                state: AudioSessionState::NoAudio,
                error_message: None,
            }),
            session: Mutex::new(None),
        }
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Arc<ViewportSession>>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// React to an audio session state change
    ///
    /// `Ready` with a waveform starts a new session (replacing any old one),
    /// `NoAudio` disposes the current session. Other states only change what
    /// gets painted.
    pub fn on_app_state_changed(&self, state: AudioSessionState, waveform: Option<Arc<Waveform>>) {
        self.audio.store(Arc::new(AudioStatus {
            state,
            error_message: None,
        }));

        match state {
            AudioSessionState::Ready => {
                let Some(waveform) = waveform else {
                    if self.session_slot().is_none() {
                        log::warn!("[VIEWPORT] Audio ready but no waveform supplied");
                    }
                    return;
                };
                let mut slot = self.session_slot();
                if let Some(old) = slot.take() {
                    old.dispose(self.engine.as_ref());
                }
                let session = ViewportSession::new(
                    self.engine.as_ref(),
                    self.state.clone(),
                    waveform,
                    self.smoothing,
                );
                log::debug!(
                    "[VIEWPORT] Created viewport session for sample rate: {} Hz",
                    session.sample_rate()
                );
                *slot = Some(Arc::new(session));
            }
            AudioSessionState::NoAudio => {
                if let Some(session) = self.session_slot().take() {
                    session.dispose(self.engine.as_ref());
                    log::debug!("[VIEWPORT] Disposed viewport session");
                }
            }
            _ => {}
        }
    }

    /// Enter the error state with a message for the painter
    pub fn on_audio_error(&self, message: impl Into<String>) {
        self.audio.store(Arc::new(AudioStatus {
            state: AudioSessionState::Error,
            error_message: Some(message.into()),
        }));
    }

    pub fn audio_state(&self) -> AudioSessionState {
        self.audio.load().state
    }

    pub fn on_playback_update(&self, playhead_seconds: f64) {
        self.state
            .apply("PLAYBACK", ViewportEvent::PlaybackUpdate { playhead_seconds });
    }

    /// Set zoom, clamped to [`MIN_PIXELS_PER_SECOND`]..=[`MAX_PIXELS_PER_SECOND`]
    ///
    /// Zero is ignored with a warning.
    pub fn on_user_zoom(&self, pixels_per_second: u32) {
        self.state.user_zoom(pixels_per_second);
    }

    pub fn on_user_seek(&self, target_seconds: f64) {
        self.state
            .apply("USER_SEEK", ViewportEvent::UserSeek { target_seconds });
    }

    pub fn on_canvas_resize(&self, width: u32, height: u32) {
        self.state
            .apply("CANVAS", ViewportEvent::CanvasResize { width, height });
    }

    pub fn context(&self) -> ViewportContext {
        self.state.context()
    }

    pub fn current_session(&self) -> Option<Arc<ViewportSession>> {
        self.session_slot().clone()
    }

    /// Visible time range, `None` with no file open
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.current_session()
            .map(|_| self.state.context().time_range())
    }

    pub fn pixels_per_second(&self) -> u32 {
        self.state.context().pixels_per_second
    }

    pub fn playback_position_seconds(&self) -> f64 {
        self.current_session()
            .map(|s| s.playback_position_seconds())
            .unwrap_or(0.0)
    }

    pub fn is_playing(&self) -> bool {
        self.current_session().is_some_and(|s| s.is_playing())
    }

    pub fn waveform(&self) -> Option<Arc<Waveform>> {
        self.current_session().map(|s| s.waveform().clone())
    }

    /// Recorded events, newest first
    pub fn event_history(&self) -> Vec<RecordedEvent> {
        self.state.history().iter().rev().copied().collect()
    }

    pub fn event_history_debug_string(&self) -> String {
        let now = Instant::now();
        let mut out = String::from("Recent viewport events (newest first):\n");
        for recorded in self.event_history() {
            let age_ms = now.duration_since(recorded.at).as_millis();
            let _ = writeln!(
                out,
                "  {:>4}ms ago: {:<20} from {:<10} [{}]",
                age_ms,
                recorded.event.name(),
                recorded.source,
                recorded.event.details()
            );
        }
        out
    }

    /// Project the current state onto a `width` x `height` canvas and render
    /// the waveform for it
    pub fn render_spec(&self, width: u32, height: u32) -> WaveformResult<RenderSpec> {
        let ctx = self.state.context();
        if ctx.canvas_width != width || ctx.canvas_height != height {
            self.on_canvas_resize(width, height);
        }
        let ctx = self.state.context();
        let status = self.audio.load_full();

        let Some(session) = self.current_session() else {
            let state = match status.state {
                AudioSessionState::Loading | AudioSessionState::Error => status.state,
                _ => AudioSessionState::NoAudio,
            };
            let snapshot = AudioSessionSnapshot {
                state,
                playhead_frame: 0,
                total_frames: 0,
                sample_rate: 0,
                error_message: status.error_message.clone(),
            };
            let projection = super::project(&snapshot, &ViewportUiState::new(width, height, 1.0)?);
            return Ok(self.spec(projection, None, &ctx));
        };

        let sample_rate = session.sample_rate();
        let waveform = session.waveform();
        let state = if session.is_playing() {
            AudioSessionState::Playing
        } else {
            status.state
        };
        let snapshot = AudioSessionSnapshot {
            state,
            playhead_frame: (ctx.playhead_seconds * sample_rate as f64).round() as u64,
            total_frames: waveform.metadata().total_frames,
            sample_rate,
            error_message: status.error_message.clone(),
        };
        let ui = ViewportUiState::from_pixels_per_second(width, height, ctx.pixels_per_second, sample_rate)?;
        let projection = session.projector.project(&snapshot, &ui);

        let image = if projection.mode == PaintMode::Render && width > 0 && height > 0 {
            waveform.set_time_resolution(ctx.pixels_per_second)?;
            waveform.set_amplitude_resolution(height)?;
            Some(waveform.render_window(projection.view_start_frame, width)?)
        } else {
            None
        };

        Ok(self.spec(projection, image, &ctx))
    }

    fn spec(&self, projection: Projection, image: Option<RgbImage>, ctx: &ViewportContext) -> RenderSpec {
        let spec_id = format!(
            "{:016x}-{}x{}@{}",
            projection.generation, ctx.canvas_width, ctx.canvas_height, ctx.pixels_per_second
        );
        RenderSpec {
            mode: projection.mode,
            error_message: projection.error_message.clone(),
            image,
            generation: projection.generation,
            projection,
            spec_id,
        }
    }
}

impl Drop for ViewportSessionManager {
    fn drop(&mut self) {
        if let Some(session) = self.session_slot().take() {
            session.dispose(self.engine.as_ref());
        }
    }
}
