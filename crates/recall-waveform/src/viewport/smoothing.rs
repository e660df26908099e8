//! Playhead smoothing
//!
//! Playback reports arrive at the audio engine's pace, not the display's, so
//! a raw playhead makes the waveform stutter while scrolling. Each smoother
//! turns the stream of reported positions into a steadier one.
//!
//! Smoothers are time- and history-dependent by nature. They are kept out of
//! the projection math, which stays a pure function of its inputs; the caller
//! passes the time elapsed since its previous update explicitly.

use std::time::Duration;

use recall_core::config::SmoothingKind;

/// Frames apart before predictive and PLL smoothing give up and jump
const RESYNC_THRESHOLD: f64 = 1000.0;

/// Weight of the previous rate when blending in a newly observed one
const RATE_MEMORY: f64 = 0.7;

/// Share of the observed drift corrected per predictive update
const DRIFT_CORRECTION: f64 = 0.1;

const PLL_PHASE_GAIN: f64 = 0.1;
const PLL_FREQUENCY_GAIN: f64 = 0.001;
/// Frequency bounds in frames per millisecond (20 kHz - 96 kHz)
const PLL_MIN_FREQUENCY: f64 = 20.0;
const PLL_MAX_FREQUENCY: f64 = 96.0;
/// Assumed frame time when an update reports no elapsed time
const PLL_FALLBACK_MS: f64 = 16.0;

/// Output of one smoother update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingResult {
    /// Position to draw the playhead at
    pub smoothed_frame: i64,
    /// `target - smoothed`, positive when the display lags behind
    pub distance_from_target: i64,
}

impl SmoothingResult {
    fn snapped(target_frame: i64) -> Self {
        Self {
            smoothed_frame: target_frame,
            distance_from_target: 0,
        }
    }

    fn at(target_frame: i64, smoothed_frame: i64) -> Self {
        Self {
            smoothed_frame,
            distance_from_target: target_frame - smoothed_frame,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearState {
    previous_target: i64,
    current_target: i64,
    /// Time since `current_target` was reported
    since_update_ms: f64,
    /// Observed playback rate in frames per millisecond
    rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictiveState {
    position: i64,
    last_target: i64,
    was_playing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseLockedState {
    phase: f64,
    /// Locked frequency in frames per millisecond
    frequency: f64,
    /// Low-passed phase error, for diagnostics
    phase_error: f64,
    last_target: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Strategy {
    None,
    LinearInterpolation(LinearState),
    PredictiveExtrapolation(PredictiveState),
    PhaseLockedLoop(PhaseLockedState),
}

/// Playhead smoother, one strategy chosen at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayheadSmoother {
    strategy: Strategy,
    /// Nominal playback rate in frames per millisecond
    nominal_rate: f64,
}

impl PlayheadSmoother {
    /// Create a smoother for audio at `sample_rate`
    pub fn new(kind: SmoothingKind, sample_rate: u32) -> Self {
        let nominal_rate = sample_rate.max(1) as f64 / 1000.0;
        let mut smoother = Self {
            strategy: Strategy::None,
            nominal_rate,
        };
        smoother.strategy = smoother.initial_strategy(kind);
        smoother
    }

    /// Create a smoother from a configuration name (unknown names fall back
    /// to predictive extrapolation)
    pub fn from_name(name: &str, sample_rate: u32) -> Self {
        Self::new(SmoothingKind::from_name(name), sample_rate)
    }

    fn initial_strategy(&self, kind: SmoothingKind) -> Strategy {
        match kind {
            SmoothingKind::None => Strategy::None,
            SmoothingKind::LinearInterpolation => Strategy::LinearInterpolation(LinearState {
                previous_target: 0,
                current_target: 0,
                since_update_ms: 0.0,
                rate: self.nominal_rate,
            }),
            SmoothingKind::PredictiveExtrapolation => {
                Strategy::PredictiveExtrapolation(PredictiveState {
                    position: 0,
                    last_target: 0,
                    was_playing: false,
                })
            }
            SmoothingKind::PhaseLockedLoop => Strategy::PhaseLockedLoop(PhaseLockedState {
                phase: 0.0,
                frequency: self.nominal_rate,
                phase_error: 0.0,
                last_target: 0,
            }),
        }
    }

    pub fn kind(&self) -> SmoothingKind {
        match self.strategy {
            Strategy::None => SmoothingKind::None,
            Strategy::LinearInterpolation(_) => SmoothingKind::LinearInterpolation,
            Strategy::PredictiveExtrapolation(_) => SmoothingKind::PredictiveExtrapolation,
            Strategy::PhaseLockedLoop(_) => SmoothingKind::PhaseLockedLoop,
        }
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.strategy = self.initial_strategy(self.kind());
        log::debug!("[VIEWPORT] {} smoother reset", self.kind().name());
    }

    /// Feed the latest reported position
    ///
    /// # Arguments
    /// * `target_frame` - Position reported by the audio engine
    /// * `elapsed` - Time since the previous call
    /// * `playing` - Whether audio is playing; when not, every strategy snaps
    ///   to the target
    pub fn update(&mut self, target_frame: i64, elapsed: Duration, playing: bool) -> SmoothingResult {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let nominal_rate = self.nominal_rate;

        let result = match &mut self.strategy {
            Strategy::None => SmoothingResult::snapped(target_frame),
            Strategy::LinearInterpolation(state) => {
                update_linear(state, target_frame, elapsed_ms, playing, nominal_rate)
            }
            Strategy::PredictiveExtrapolation(state) => {
                update_predictive(state, target_frame, elapsed_ms, playing, nominal_rate)
            }
            Strategy::PhaseLockedLoop(state) => {
                update_phase_locked(state, target_frame, elapsed_ms, playing, nominal_rate)
            }
        };

        log::trace!(
            "[VIEWPORT] Playhead smoothing [{}]: target={} smoothed={} distance={}",
            self.kind().name(),
            target_frame,
            result.smoothed_frame,
            result.distance_from_target
        );
        result
    }
}

/// Interpolates between the last two reports at the observed rate, never past
/// the newest report
fn update_linear(
    state: &mut LinearState,
    target_frame: i64,
    elapsed_ms: f64,
    playing: bool,
    nominal_rate: f64,
) -> SmoothingResult {
    if !playing {
        *state = LinearState {
            previous_target: target_frame,
            current_target: target_frame,
            since_update_ms: 0.0,
            rate: nominal_rate,
        };
        return SmoothingResult::snapped(target_frame);
    }

    state.since_update_ms += elapsed_ms;
    if target_frame != state.current_target {
        let frames_delta = (target_frame - state.current_target) as f64;
        let time_delta = state.since_update_ms;
        if time_delta > 0.0 && frames_delta > 0.0 {
            let observed = frames_delta / time_delta;
            state.rate = state.rate * RATE_MEMORY + observed * (1.0 - RATE_MEMORY);
        }
        state.previous_target = state.current_target;
        state.current_target = target_frame;
        state.since_update_ms = 0.0;
    }

    let advance = (state.since_update_ms * state.rate).round() as i64;
    let smoothed = state.current_target.min(state.previous_target + advance);
    SmoothingResult::at(target_frame, smoothed)
}

/// Runs ahead at the nominal rate, pulling 10% of the drift back each update
fn update_predictive(
    state: &mut PredictiveState,
    target_frame: i64,
    elapsed_ms: f64,
    playing: bool,
    nominal_rate: f64,
) -> SmoothingResult {
    if !playing {
        *state = PredictiveState {
            position: target_frame,
            last_target: target_frame,
            was_playing: false,
        };
        return SmoothingResult::snapped(target_frame);
    }

    let resync = |state: &mut PredictiveState| {
        *state = PredictiveState {
            position: target_frame,
            last_target: target_frame,
            was_playing: true,
        };
    };

    if !state.was_playing || ((target_frame - state.last_target) as f64).abs() > RESYNC_THRESHOLD {
        log::debug!(
            "[VIEWPORT] Resyncing playhead to {} (was at {})",
            target_frame,
            state.position
        );
        resync(state);
    } else {
        let extrapolated = state.position + (elapsed_ms * nominal_rate).round() as i64;
        let drift = target_frame - extrapolated;
        if (drift as f64).abs() > RESYNC_THRESHOLD {
            log::debug!("[VIEWPORT] Playhead drift of {} frames, resyncing", drift);
            resync(state);
        } else {
            state.position = extrapolated + (drift as f64 * DRIFT_CORRECTION).round() as i64;
            state.last_target = target_frame;
        }
    }

    SmoothingResult::at(target_frame, state.position)
}

/// Tracks position (phase) and rate (frequency) with proportional and
/// integral correction
fn update_phase_locked(
    state: &mut PhaseLockedState,
    target_frame: i64,
    elapsed_ms: f64,
    playing: bool,
    nominal_rate: f64,
) -> SmoothingResult {
    if !playing {
        *state = PhaseLockedState {
            phase: target_frame as f64,
            frequency: nominal_rate,
            phase_error: 0.0,
            last_target: target_frame,
        };
        return SmoothingResult::snapped(target_frame);
    }

    let dt = if elapsed_ms > 0.0 { elapsed_ms } else { PLL_FALLBACK_MS };
    let expected = state.phase + state.frequency * dt;
    let error = target_frame as f64 - expected;

    if error.abs() > RESYNC_THRESHOLD
        || ((target_frame - state.last_target) as f64).abs() > RESYNC_THRESHOLD
    {
        log::debug!("[VIEWPORT] PLL lock lost, resyncing to {}", target_frame);
        state.phase = target_frame as f64;
        state.phase_error = 0.0;
        state.last_target = target_frame;
    } else {
        let min_frequency = PLL_MIN_FREQUENCY.min(nominal_rate);
        let max_frequency = PLL_MAX_FREQUENCY.max(nominal_rate);
        state.frequency =
            (state.frequency + error * PLL_FREQUENCY_GAIN).clamp(min_frequency, max_frequency);
        state.phase = expected + error * PLL_PHASE_GAIN;
        state.phase_error = state.phase_error * 0.95 + error * 0.05;
        state.last_target = target_frame;
    }

    SmoothingResult::at(target_frame, state.phase.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn all_kinds() -> [SmoothingKind; 4] {
        [
            SmoothingKind::None,
            SmoothingKind::LinearInterpolation,
            SmoothingKind::PredictiveExtrapolation,
            SmoothingKind::PhaseLockedLoop,
        ]
    }

    #[test]
    fn test_paused_snaps_to_target() {
        for kind in all_kinds() {
            let mut smoother = PlayheadSmoother::new(kind, RATE);
            let result = smoother.update(123_456, ms(16), false);
            assert_eq!(result, SmoothingResult::snapped(123_456), "{:?}", kind);
        }
    }

    #[test]
    fn test_none_passes_through() {
        let mut smoother = PlayheadSmoother::new(SmoothingKind::None, RATE);
        assert_eq!(smoother.update(10, ms(16), true).smoothed_frame, 10);
        assert_eq!(smoother.update(900, ms(16), true).smoothed_frame, 900);
    }

    #[test]
    fn test_linear_interpolates_without_overshoot() {
        let mut smoother = PlayheadSmoother::new(SmoothingKind::LinearInterpolation, RATE);
        smoother.update(0, ms(0), false);

        // New report: display starts from the previous one
        let first = smoother.update(441, ms(10), true);
        assert_eq!(first.smoothed_frame, 0);
        assert_eq!(first.distance_from_target, 441);

        // No new report: advance at the observed rate
        let mid = smoother.update(441, ms(5), true);
        assert!(mid.smoothed_frame > 0 && mid.smoothed_frame < 441);

        // Never past the newest report
        let late = smoother.update(441, ms(100), true);
        assert_eq!(late.smoothed_frame, 441);
        assert_eq!(late.distance_from_target, 0);
    }

    #[test]
    fn test_predictive_extrapolates_and_corrects() {
        let mut smoother = PlayheadSmoother::new(SmoothingKind::PredictiveExtrapolation, RATE);
        // First playing update resyncs
        assert_eq!(smoother.update(10_000, ms(0), true).smoothed_frame, 10_000);

        // 10 ms at 44.1 f/ms = 441 frames ahead, target agrees exactly
        let on_time = smoother.update(10_441, ms(10), true);
        assert_eq!(on_time.smoothed_frame, 10_441);

        // Target 100 frames behind the extrapolation: correct by 10
        let drifting = smoother.update(10_782, ms(10), true);
        assert_eq!(drifting.smoothed_frame, 10_882 - 10);
    }

    #[test]
    fn test_predictive_resyncs_on_seek() {
        let mut smoother = PlayheadSmoother::new(SmoothingKind::PredictiveExtrapolation, RATE);
        smoother.update(0, ms(0), true);
        let seek = smoother.update(500_000, ms(16), true);
        assert_eq!(seek.smoothed_frame, 500_000);
        assert_eq!(seek.distance_from_target, 0);
    }

    #[test]
    fn test_phase_locked_converges() {
        let mut smoother = PlayheadSmoother::new(SmoothingKind::PhaseLockedLoop, RATE);
        smoother.update(0, ms(0), false);

        let mut target = 0;
        let mut last = SmoothingResult::snapped(0);
        for _ in 0..200 {
            target += 706; // 16 ms at 44.1 f/ms, rounded up
            last = smoother.update(target, ms(16), true);
        }
        assert!(last.distance_from_target.abs() < 50, "{:?}", last);
    }

    #[test]
    fn test_phase_locked_resyncs_on_jump() {
        let mut smoother = PlayheadSmoother::new(SmoothingKind::PhaseLockedLoop, RATE);
        smoother.update(0, ms(0), false);
        let jump = smoother.update(1_000_000, ms(16), true);
        assert_eq!(jump.smoothed_frame, 1_000_000);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        for kind in all_kinds() {
            let fresh = PlayheadSmoother::new(kind, RATE);
            let mut smoother = fresh;
            smoother.update(5000, ms(16), true);
            smoother.update(5700, ms(16), true);
            smoother.reset();
            assert_eq!(smoother, fresh, "{:?}", kind);
        }
    }

    #[test]
    fn test_unknown_name_falls_back_to_predictive() {
        let smoother = PlayheadSmoother::from_name("cubic-spline", RATE);
        assert_eq!(smoother.kind(), SmoothingKind::PredictiveExtrapolation);
        let smoother = PlayheadSmoother::from_name("phase-locked-loop", RATE);
        assert_eq!(smoother.kind(), SmoothingKind::PhaseLockedLoop);
    }
}
