//! Waveform façade: one instance per open audio file
//!
//! Owns the render configuration, the per-resolution global rendering peak and
//! the chunk cache, and ties the processor and renderer together.
//!
//! ## Resolution changes
//!
//! Time resolution (px/s) and amplitude resolution (px height) are atomics
//! read at the start of every lookup and baked into the [`ChunkKey`]. A lookup
//! that starts after a setter returns therefore builds a key at the new
//! resolution and can never be served an image rendered at the old one. Old
//! entries simply age out of the LRU.
//!
//! ## Global rendering peak
//!
//! Vertical scale comes from a peak computed once per time resolution from
//! chunk 0 and reused for every chunk, so the scale does not jump while
//! scrolling and a chunk renders identically no matter which chunk was viewed
//! first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use image::{imageops, RgbImage};

use recall_core::audio_file::{AudioMetadata, AudioSource};
use recall_core::config::WaveformConfig;
use recall_core::sample_math;
use recall_core::signal::{pixel_scale, rendering_peak};
use recall_core::{FrequencyRange, WaveformError, WaveformResult};

use crate::chunk_cache::{render_pool, CacheStats, ChunkCache, ChunkKey, RenderedChunk};
use crate::processor::WaveformProcessor;
use crate::renderer::{render_waveform_chunk, BACKGROUND};

/// Chunk the global rendering peak is measured on
const PEAK_CHUNK: u32 = 0;

type PeakSlot = Arc<OnceLock<WaveformResult<f64>>>;

/// Everything a render needs, shared with the cache's worker threads
struct RenderContext {
    path: PathBuf,
    metadata: AudioMetadata,
    config: WaveformConfig,
    band_pass: FrequencyRange,
    processor: WaveformProcessor,
    /// Global rendering peak per time resolution
    peaks: Mutex<HashMap<u32, PeakSlot>>,
}

impl RenderContext {
    fn chunk_pixels(&self, chunk_number: u32, pixels_per_second: u32) -> WaveformResult<Vec<f64>> {
        self.processor.process_audio_for_display(
            &self.path,
            chunk_number,
            self.config.chunk_seconds,
            self.config.overlap_seconds,
            self.band_pass.min_frequency(),
            self.band_pass.max_frequency(),
            self.config.chunk_width_pixels(pixels_per_second),
        )
    }

    /// Peak for `pixels_per_second`, computed on first use
    ///
    /// Concurrent first callers share one computation.
    fn global_peak(&self, pixels_per_second: u32) -> WaveformResult<f64> {
        let slot = {
            let mut peaks = match self.peaks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            peaks.entry(pixels_per_second).or_default().clone()
        };

        slot.get_or_init(|| {
            let start = Instant::now();
            let pixels = self.chunk_pixels(PEAK_CHUNK, pixels_per_second)?;
            let skip = (pixels_per_second as usize / 2).max(1);
            let peak = rendering_peak(&pixels, skip);
            log::debug!(
                "[WAVEFORM] Global rendering peak at {} px/s: {:.6} ({:?})",
                pixels_per_second,
                peak,
                start.elapsed()
            );
            Ok(peak)
        })
        .clone()
    }

    /// Drop peaks measured at any other time resolution
    fn retain_peak(&self, pixels_per_second: u32) {
        let mut peaks = match self.peaks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        peaks.retain(|resolution, _| *resolution == pixels_per_second);
    }

    fn clear_peaks(&self) {
        let mut peaks = match self.peaks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        peaks.clear();
    }

    fn render(&self, key: ChunkKey) -> WaveformResult<RgbImage> {
        let start = Instant::now();
        let peak = self.global_peak(key.pixels_per_second)?;
        let pixels = self.chunk_pixels(key.chunk_number, key.pixels_per_second)?;
        let y_scale = pixel_scale(&pixels, key.height, peak)?;
        let start_seconds = key.chunk_number as f64 * self.config.chunk_seconds;

        let image = render_waveform_chunk(
            &pixels,
            pixels.len() as u32,
            key.height,
            y_scale,
            start_seconds,
            key.pixels_per_second,
        )?;
        log::debug!(
            "[WAVEFORM] Rendered chunk {} at {} px/s x {} px in {:?}",
            key.chunk_number,
            key.pixels_per_second,
            key.height,
            start.elapsed()
        );
        Ok(image)
    }
}

/// Chunked, cached waveform of one audio file
pub struct Waveform {
    context: Arc<RenderContext>,
    cache: ChunkCache,
    time_resolution: AtomicU32,
    amplitude_resolution: AtomicU32,
    last_chunk: u32,
}

impl Waveform {
    /// Open `path` for rendering
    ///
    /// Reads the file's metadata through `source`, converts the configured
    /// band-pass edges to normalized frequencies and starts the render pool.
    pub fn open(
        path: impl Into<PathBuf>,
        source: Arc<dyn AudioSource>,
        config: WaveformConfig,
    ) -> WaveformResult<Self> {
        let path = path.into();
        config.validate()?;

        let metadata = source
            .metadata(&path)
            .map_err(|e| WaveformError::AudioUnavailable(format!("{}: {}", path.display(), e)))?;
        if metadata.sample_rate == 0 {
            return Err(WaveformError::InvalidSampleRate(0.0));
        }

        let band_pass = config.band_pass_range(metadata.sample_rate)?;
        let last_chunk = sample_math::last_chunk_number(
            metadata.total_frames,
            metadata.sample_rate as f64,
            config.chunk_seconds,
        )?;
        let processor = WaveformProcessor::new(source, config.envelope_window, config.filter_cache)?;
        let pool = render_pool(config.effective_render_threads())?;

        let time_resolution = AtomicU32::new(config.time_resolution);
        let amplitude_resolution = AtomicU32::new(config.amplitude_resolution);
        let capacity = config.cache_capacity;

        let context = Arc::new(RenderContext {
            path,
            metadata,
            config,
            band_pass,
            processor,
            peaks: Mutex::new(HashMap::new()),
        });

        let loader_context = context.clone();
        let cache = ChunkCache::new(
            capacity,
            last_chunk,
            pool,
            Box::new(move |key| loader_context.render(key)),
        )?;

        log::info!(
            "[WAVEFORM] Opened {} ({} Hz, {} ch, {:.1}s, chunks 0..={})",
            context.path.display(),
            metadata.sample_rate,
            metadata.channels,
            metadata.duration_seconds(),
            last_chunk
        );

        Ok(Self {
            context,
            cache,
            time_resolution,
            amplitude_resolution,
            last_chunk,
        })
    }

    /// Image of chunk `chunk_number` at the current resolution
    ///
    /// Served from the cache when possible, otherwise rendered on this thread.
    /// Neighbouring chunks are prefetched in the background either way.
    pub fn render_chunk(&self, chunk_number: u32) -> WaveformResult<RenderedChunk> {
        self.cache.get_chunk(self.key_for(chunk_number))
    }

    fn key_for(&self, chunk_number: u32) -> ChunkKey {
        ChunkKey::new(
            chunk_number,
            self.time_resolution.load(Ordering::Acquire),
            self.amplitude_resolution.load(Ordering::Acquire),
        )
    }

    /// Change horizontal zoom (pixels per second)
    pub fn set_time_resolution(&self, pixels_per_second: u32) -> WaveformResult<()> {
        if pixels_per_second == 0 {
            return Err(WaveformError::InvalidResolution(pixels_per_second));
        }
        let previous = self.time_resolution.swap(pixels_per_second, Ordering::AcqRel);
        if previous != pixels_per_second {
            self.context.retain_peak(pixels_per_second);
            log::info!(
                "[WAVEFORM] Time resolution {} -> {} px/s",
                previous,
                pixels_per_second
            );
        }
        Ok(())
    }

    /// Change image height in pixels
    pub fn set_amplitude_resolution(&self, height: u32) -> WaveformResult<()> {
        if height == 0 {
            return Err(WaveformError::InvalidResolution(height));
        }
        let previous = self.amplitude_resolution.swap(height, Ordering::AcqRel);
        if previous != height {
            log::info!("[WAVEFORM] Amplitude resolution {} -> {} px", previous, height);
        }
        Ok(())
    }

    pub fn time_resolution(&self) -> u32 {
        self.time_resolution.load(Ordering::Acquire)
    }

    pub fn amplitude_resolution(&self) -> u32 {
        self.amplitude_resolution.load(Ordering::Acquire)
    }

    /// Forget every global rendering peak and every cached image
    pub fn reset_scaling(&self) {
        self.context.clear_peaks();
        self.cache.clear();
        log::info!("[WAVEFORM] Scaling reset for {}", self.context.path.display());
    }

    /// Global rendering peak at the current time resolution
    pub fn global_peak(&self) -> WaveformResult<f64> {
        self.context.global_peak(self.time_resolution())
    }

    /// Composite the chunks covering `width` pixels starting at `start_frame`
    ///
    /// `start_frame` may be negative (window extends before the file start);
    /// anything outside the file is left as background.
    pub fn render_window(&self, start_frame: i64, width: u32) -> WaveformResult<RgbImage> {
        if width == 0 {
            return Err(WaveformError::InvalidPixelWidth(0));
        }
        let key = self.key_for(0);
        let mut canvas = RgbImage::from_pixel(width, key.height, BACKGROUND);

        let chunk_width = self.context.config.chunk_width_pixels(key.pixels_per_second) as i64;
        if chunk_width == 0 {
            return Ok(canvas);
        }
        self.cache.ensure_capacity(window_cache_size(width, chunk_width));
        let start_px = self.frame_to_pixel(start_frame, key.pixels_per_second);
        let end_px = start_px + width as i64;
        if end_px <= 0 {
            return Ok(canvas);
        }

        let first = start_px.max(0) / chunk_width;
        let last = ((end_px - 1) / chunk_width).min(self.last_chunk as i64);
        for chunk in first..=last {
            let rendered = self.cache.get_chunk(key.with_chunk(chunk as u32))?;
            imageops::replace(&mut canvas, &*rendered.image, chunk * chunk_width - start_px, 0);
        }
        Ok(canvas)
    }

    fn frame_to_pixel(&self, frame: i64, pixels_per_second: u32) -> i64 {
        (frame as f64 * pixels_per_second as f64 / self.context.metadata.sample_rate as f64).floor()
            as i64
    }

    /// Chunk containing `frame`
    pub fn chunk_for_frame(&self, frame: u64) -> WaveformResult<u32> {
        let chunk = sample_math::chunk_for_frame(
            frame,
            self.context.metadata.sample_rate as f64,
            self.context.config.chunk_seconds,
        )?;
        Ok(chunk.min(self.last_chunk))
    }

    pub fn last_chunk_number(&self) -> u32 {
        self.last_chunk
    }

    pub fn path(&self) -> &Path {
        &self.context.path
    }

    pub fn metadata(&self) -> AudioMetadata {
        self.context.metadata
    }

    pub fn config(&self) -> &WaveformConfig {
        &self.context.config
    }

    /// Normalized band-pass range applied to every chunk
    pub fn band_pass(&self) -> FrequencyRange {
        self.context.band_pass
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop cached images without touching the peaks
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Wait for background prefetches to finish
    pub fn wait_idle(&self) {
        self.cache.wait_idle();
    }

    /// Stop rendering for this file
    ///
    /// Later lookups fail with [`WaveformError::NoAudioLoaded`].
    pub fn close(&self) {
        if self.cache.is_closed() {
            return;
        }
        self.cache.close();
        self.context.clear_peaks();
        log::info!(
            "[WAVEFORM] Closed {} ({})",
            self.context.path.display(),
            self.cache.stats()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.cache.is_closed()
    }
}

impl Drop for Waveform {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cache entries needed to composite `width` pixels without evicting what
/// is on screen
///
/// Visible chunks (one extra when the window straddles a boundary) plus both
/// prefetch neighbours, with half again as headroom for renders in flight.
fn window_cache_size(width: u32, chunk_width: i64) -> usize {
    let visible = (width as i64 + chunk_width - 1) / chunk_width + 1;
    (visible as usize + 2) * 3 / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::test_support::{FailingSource, ToneSource};
    use crate::renderer::REFERENCE_LINE;
    use recall_core::audio_file::WavAudioSource;
    use std::thread;

    fn test_config() -> WaveformConfig {
        WaveformConfig {
            time_resolution: 20,
            amplitude_resolution: 60,
            render_threads: 2,
            ..Default::default()
        }
    }

    fn open_tone(seconds: f64) -> (Waveform, Arc<ToneSource>) {
        let source = Arc::new(ToneSource::new(8000, seconds));
        let waveform = Waveform::open("tone.wav", source.clone(), test_config()).unwrap();
        (waveform, source)
    }

    #[test]
    fn test_open_reports_layout() {
        let (waveform, _) = open_tone(25.0);
        assert_eq!(waveform.last_chunk_number(), 2);
        assert_eq!(waveform.metadata().sample_rate, 8000);
        // 16 kHz is above Nyquist at 8 kHz
        assert!(waveform.band_pass().max_frequency() < 0.5);
        assert_eq!(waveform.chunk_for_frame(85_000).unwrap(), 1);
        assert_eq!(waveform.chunk_for_frame(10_000_000).unwrap(), 2);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let source = Arc::new(ToneSource::new(8000, 1.0));
        let config = WaveformConfig {
            time_resolution: 0,
            ..test_config()
        };
        assert!(Waveform::open("tone.wav", source, config).is_err());
    }

    #[test]
    fn test_chunk_dimensions_follow_resolution() {
        let (waveform, _) = open_tone(25.0);
        let chunk = waveform.render_chunk(1).unwrap();
        assert_eq!(chunk.image.dimensions(), (200, 60));
        assert_eq!(chunk.chunk_number(), 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let (waveform, _) = open_tone(25.0);
        let first = waveform.render_chunk(1).unwrap();
        waveform.wait_idle();
        waveform.clear_cache();
        let second = waveform.render_chunk(1).unwrap();
        assert!(!Arc::ptr_eq(&first.image, &second.image));
        assert_eq!(first.image.as_raw(), second.image.as_raw());
    }

    #[test]
    fn test_scroll_order_does_not_change_images() {
        let (forward, _) = open_tone(25.0);
        let (backward, _) = open_tone(25.0);

        forward.render_chunk(0).unwrap();
        let a = forward.render_chunk(2).unwrap();
        let b = backward.render_chunk(2).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }

    #[test]
    fn test_resolution_change_is_never_stale() {
        let (waveform, _) = open_tone(25.0);
        let before = waveform.render_chunk(0).unwrap();
        assert_eq!(before.image.dimensions(), (200, 60));

        waveform.set_time_resolution(30).unwrap();
        let wider = waveform.render_chunk(0).unwrap();
        assert_eq!(wider.image.dimensions(), (300, 60));
        assert_eq!(wider.key.pixels_per_second, 30);

        waveform.set_amplitude_resolution(90).unwrap();
        let taller = waveform.render_chunk(0).unwrap();
        assert_eq!(taller.image.dimensions(), (300, 90));
        assert_eq!(taller.key.height, 90);
    }

    #[test]
    fn test_setters_reject_zero() {
        let (waveform, _) = open_tone(5.0);
        assert!(waveform.set_time_resolution(0).is_err());
        assert!(waveform.set_amplitude_resolution(0).is_err());
        assert_eq!(waveform.time_resolution(), 20);
        assert_eq!(waveform.amplitude_resolution(), 60);

        waveform.set_time_resolution(20).unwrap();
        assert_eq!(waveform.time_resolution(), 20);
    }

    #[test]
    fn test_global_peak_computed_once_per_resolution() {
        let (waveform, source) = open_tone(35.0);
        waveform.render_chunk(2).unwrap();
        waveform.wait_idle();
        // Peak measurement only; chunks 1..=3 never read chunk 0
        assert_eq!(source.reads_of(0), 1);

        let peak = waveform.global_peak().unwrap();
        assert!(peak > 0.0);
        assert_eq!(source.reads_of(0), 1);

        waveform.set_time_resolution(40).unwrap();
        waveform.render_chunk(2).unwrap();
        waveform.wait_idle();
        assert_eq!(source.reads_of(0), 2);

        waveform.reset_scaling();
        waveform.render_chunk(2).unwrap();
        waveform.wait_idle();
        assert_eq!(source.reads_of(0), 3);
    }

    #[test]
    fn test_concurrent_first_render_shares_peak() {
        let source = Arc::new(ToneSource::new(8000, 25.0).with_delay(std::time::Duration::from_millis(30)));
        let waveform = Arc::new(Waveform::open("tone.wav", source.clone(), test_config()).unwrap());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let waveform = waveform.clone();
                thread::spawn(move || waveform.render_chunk(1).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        waveform.wait_idle();

        assert_eq!(source.reads_of(1), 1);
        // One peak measurement plus the render of chunk 0 as a neighbour
        assert_eq!(source.reads_of(0), 2);
    }

    #[test]
    fn test_read_failure_renders_blank_strip() {
        let source = Arc::new(FailingSource {
            sample_rate: 8000,
            total_frames: 80_000,
        });
        let waveform = Waveform::open("gone.wav", source, test_config()).unwrap();
        let chunk = waveform.render_chunk(0).unwrap();

        // Above the centerline only gridlines remain
        for x in (1..200).filter(|x| x % 20 != 0) {
            for y in 0..30 {
                assert_eq!(*chunk.image.get_pixel(x, y), BACKGROUND);
            }
        }
        assert_eq!(*chunk.image.get_pixel(7, 30), REFERENCE_LINE);
    }

    #[test]
    fn test_window_composites_chunks() {
        let (waveform, _) = open_tone(25.0);
        let chunk0 = waveform.render_chunk(0).unwrap();
        let chunk1 = waveform.render_chunk(1).unwrap();

        // 5 s into the file at 20 px/s is pixel 100; 200 px spans chunks 0 and 1
        let window = waveform.render_window(5 * 8000, 200).unwrap();
        assert_eq!(window.dimensions(), (200, 60));
        for y in 0..60 {
            assert_eq!(window.get_pixel(0, y), chunk0.image.get_pixel(100, y));
            assert_eq!(window.get_pixel(99, y), chunk0.image.get_pixel(199, y));
            assert_eq!(window.get_pixel(100, y), chunk1.image.get_pixel(0, y));
            assert_eq!(window.get_pixel(150, y), chunk1.image.get_pixel(50, y));
        }
    }

    #[test]
    fn test_window_pads_before_file_start() {
        let (waveform, _) = open_tone(25.0);
        let chunk0 = waveform.render_chunk(0).unwrap();

        // Two seconds before the start: 40 px of padding
        let window = waveform.render_window(-2 * 8000, 100).unwrap();
        for y in 0..60 {
            assert_eq!(*window.get_pixel(10, y), BACKGROUND);
            assert_eq!(window.get_pixel(40, y), chunk0.image.get_pixel(0, y));
        }

        let before = waveform.render_window(-100_000, 50).unwrap();
        assert!(before.pixels().all(|p| *p == BACKGROUND));
        assert!(waveform.render_window(0, 0).is_err());
    }

    #[test]
    fn test_window_pads_after_file_end() {
        let (waveform, _) = open_tone(25.0);
        // Chunk 2 ends at 600 px; everything from there is background
        let window = waveform.render_window(25 * 8000, 200).unwrap();
        for y in 0..60 {
            assert_eq!(*window.get_pixel(150, y), BACKGROUND);
        }
    }

    #[test]
    fn test_repeated_window_is_served_from_cache() {
        let (waveform, source) = open_tone(120.0);
        // 30 s at 20 px/s is pixel 600; 600 px covers chunks 3, 4 and 5
        let first = waveform.render_window(30 * 8000, 600).unwrap();
        waveform.wait_idle();
        let reads = source.reads();
        let before = waveform.cache_stats();

        for _ in 0..5 {
            let again = waveform.render_window(30 * 8000, 600).unwrap();
            assert_eq!(again.as_raw(), first.as_raw());
        }
        waveform.wait_idle();

        let after = waveform.cache_stats();
        assert_eq!(source.reads(), reads);
        assert_eq!(after.misses, before.misses);
        assert_eq!(after.hits, before.hits + 15);
        assert_eq!(after.evictions, before.evictions);
    }

    #[test]
    fn test_window_cache_size_covers_visible_and_neighbours() {
        // 1000 px over 2000 px chunks: up to 2 visible, 2 neighbours
        assert_eq!(window_cache_size(1000, 2000), 6);
        assert_eq!(window_cache_size(600, 200), 9);
    }

    #[test]
    fn test_reset_scaling_with_queued_prefetches_completes() {
        let source = Arc::new(ToneSource::new(8000, 60.0));
        let config = WaveformConfig {
            render_threads: 4,
            ..test_config()
        };
        let waveform = Waveform::open("tone.wav", source, config).unwrap();
        let last = waveform.last_chunk_number();

        for round in 0..20u32 {
            waveform.render_chunk(round % (last + 1)).unwrap();
            waveform.reset_scaling();
            waveform.wait_idle();
        }
        waveform.close();
        assert!(waveform.is_closed());
    }

    #[test]
    fn test_resolution_change_drops_other_peaks() {
        let (waveform, _) = open_tone(25.0);
        for resolution in [20, 40, 80] {
            waveform.set_time_resolution(resolution).unwrap();
            waveform.render_chunk(1).unwrap();
            waveform.wait_idle();
        }

        let peaks = waveform.context.peaks.lock().unwrap();
        assert_eq!(peaks.len(), 1);
        assert!(peaks.contains_key(&80));
    }

    #[test]
    fn test_close_stops_rendering() {
        let (waveform, _) = open_tone(15.0);
        waveform.render_chunk(0).unwrap();
        waveform.close();
        assert!(waveform.is_closed());
        assert_eq!(waveform.render_chunk(0).unwrap_err(), WaveformError::NoAudioLoaded);
        waveform.close();
    }

    #[test]
    fn test_wav_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..16000 * 12 {
            let t = i as f64 / 16000.0;
            let v = (0.6 * (2.0 * std::f64::consts::PI * 2500.0 * t).sin() * i16::MAX as f64) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let waveform = Waveform::open(&path, Arc::new(WavAudioSource::new()), test_config()).unwrap();
        assert_eq!(waveform.metadata().channels, 2);
        assert_eq!(waveform.last_chunk_number(), 1);

        let chunk = waveform.render_chunk(0).unwrap();
        assert_eq!(chunk.image.dimensions(), (200, 60));
        let ink = chunk.image.enumerate_pixels().filter(|(_, y, p)| *y < 25 && **p == REFERENCE_LINE).count();
        assert!(ink > 0);
    }
}
