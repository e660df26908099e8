//! Recall Waveform - chunked waveform images and the viewport that shows them
//!
//! ## Architecture
//!
//! - **Processor**: audio chunk → band-pass → envelope → pixel columns
//! - **Renderer**: pixel columns → `RgbImage` with centerline and time scale
//! - **Chunk cache**: LRU of rendered chunks, neighbours prefetched on a rayon pool
//! - **Waveform**: one open file; owns the cache and the per-resolution peak
//! - **Viewport**: playhead-centred projection, smoothing and session lifecycle
//!
//! A chunk that cannot be read comes back as a blank strip with the time
//! scale still drawn, never as an error to the painter.

pub mod chunk_cache;
pub mod processor;
pub mod renderer;
pub mod viewport;
pub mod waveform;

pub use chunk_cache::{CacheStats, ChunkCache, ChunkKey, RenderedChunk};
pub use processor::WaveformProcessor;
pub use renderer::render_waveform_chunk;
pub use viewport::{
    AudioSessionState, PaintMode, Projection, RenderSpec, ViewportContext, ViewportSession,
    ViewportSessionManager,
};
pub use waveform::Waveform;
