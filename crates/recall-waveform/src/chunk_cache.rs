//! Bounded cache of rendered chunks with neighbour prefetch
//!
//! The viewport only ever needs a small sliding window of chunks, so the cache
//! holds a handful of entries (current, previous and next by default) and
//! evicts the least recently used one. Callers that show several chunks at once
//! grow the capacity with [`ChunkCache::ensure_capacity`] so their own
//! prefetches do not evict what they are painting.
//!
//! ## Single-flight
//!
//! Every key maps to one shared slot. The first caller for a key renders into
//! the slot; concurrent callers for the same key block on that slot and get the
//! same result, so a chunk is never rendered twice at once.
//!
//! ## Prefetch
//!
//! After every lookup the neighbouring chunks (clamped to `[0, last_chunk]`)
//! are rendered on the cache's worker pool. The caller never waits for them.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};

use image::RgbImage;
use rayon::ThreadPool;

use recall_core::{WaveformError, WaveformResult};

/// Cache key: chunk number plus the resolution it was rendered at
///
/// Resolution is part of the key, so changing zoom or height makes old
/// entries unreachable instead of returning them at the wrong size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub chunk_number: u32,
    /// Time resolution in pixels per second
    pub pixels_per_second: u32,
    /// Amplitude resolution (image height) in pixels
    pub height: u32,
}

impl ChunkKey {
    pub fn new(chunk_number: u32, pixels_per_second: u32, height: u32) -> Self {
        Self {
            chunk_number,
            pixels_per_second,
            height,
        }
    }

    /// Same resolution, different chunk
    pub fn with_chunk(self, chunk_number: u32) -> Self {
        Self {
            chunk_number,
            ..self
        }
    }
}

/// A chunk image ready for painting
///
/// Cheap to clone; the image is shared.
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub key: ChunkKey,
    pub image: Arc<RgbImage>,
}

impl RenderedChunk {
    pub fn chunk_number(&self) -> u32 {
        self.key.chunk_number
    }
}

/// Renders the chunk for a key; called from caller and worker threads
pub type ChunkLoader = dyn Fn(ChunkKey) -> WaveformResult<RgbImage> + Send + Sync;

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by an existing slot (finished or in flight)
    pub hits: u64,
    /// Lookups that had to create a slot
    pub misses: u64,
    /// Renders actually executed
    pub loads: u64,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
    /// Neighbour renders scheduled on the worker pool
    pub prefetches: u64,
}

impl CacheStats {
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups served from the cache (0.0 with no lookups)
    pub fn hit_rate(&self) -> f64 {
        let requests = self.requests();
        if requests == 0 {
            return 0.0;
        }
        self.hits as f64 / requests as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests={} hits={} misses={} hit_rate={:.1}% loads={} evictions={} prefetches={}",
            self.requests(),
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.loads,
            self.evictions,
            self.prefetches
        )
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
    prefetches: AtomicU64,
}

type Slot = Arc<OnceLock<WaveformResult<RenderedChunk>>>;

/// Entries plus recency order, most recent at the back
#[derive(Default)]
struct Entries {
    slots: HashMap<ChunkKey, Slot>,
    order: VecDeque<ChunkKey>,
}

impl Entries {
    fn touch(&mut self, key: ChunkKey) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key);
    }

    fn remove(&mut self, key: &ChunkKey) {
        self.slots.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

struct CacheInner {
    loader: Box<ChunkLoader>,
    /// Only ever grows
    capacity: AtomicUsize,
    last_chunk: u32,
    entries: Mutex<Entries>,
    counters: Counters,
    closed: AtomicBool,
    /// Prefetch jobs queued or running
    pending: Mutex<usize>,
    idle: Condvar,
}

impl CacheInner {
    fn entries(&self) -> MutexGuard<'_, Entries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Find or create the slot for `key`, returning whether it already existed
    fn slot(&self, key: ChunkKey) -> (Slot, bool) {
        let mut entries = self.entries();
        let existing = entries.slots.get(&key).cloned();
        let (slot, found) = match existing {
            Some(slot) => (slot, true),
            None => {
                let slot: Slot = Arc::new(OnceLock::new());
                entries.slots.insert(key, slot.clone());
                (slot, false)
            }
        };
        entries.touch(key);

        let capacity = self.capacity.load(Ordering::Acquire);
        while entries.order.len() > capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.slots.remove(&oldest);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                log::debug!("[WAVEFORM] Evicted chunk {:?}", oldest);
            }
        }
        (slot, found)
    }

    fn resolve(&self, key: ChunkKey, slot: &Slot) -> WaveformResult<RenderedChunk> {
        let result = slot
            .get_or_init(|| {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                (self.loader)(key).map(|image| RenderedChunk {
                    key,
                    image: Arc::new(image),
                })
            })
            .clone();

        if result.is_err() {
            // Failed renders are not cached, the next lookup tries again
            let mut entries = self.entries();
            if entries.slots.get(&key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
                entries.remove(&key);
            }
        }
        result
    }

    fn prefetch(&self, key: ChunkKey) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let (slot, _) = self.slot(key);
        if let Err(e) = self.resolve(key, &slot) {
            log::warn!("[WAVEFORM] Prefetch of chunk {} failed: {}", key.chunk_number, e);
        }
    }

    fn finish_job(&self) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the pending job count even if the render panics
struct JobGuard(Arc<CacheInner>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.finish_job();
    }
}

/// LRU cache of [`RenderedChunk`]s with asynchronous neighbour prefetch
pub struct ChunkCache {
    inner: Arc<CacheInner>,
    pool: Arc<ThreadPool>,
}

impl ChunkCache {
    /// Create a cache
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries kept (at least 1)
    /// * `last_chunk` - Highest valid chunk number, bounds prefetching
    /// * `pool` - Worker pool for prefetch renders
    /// * `loader` - Renders the image for a key
    pub fn new(
        capacity: usize,
        last_chunk: u32,
        pool: Arc<ThreadPool>,
        loader: Box<ChunkLoader>,
    ) -> WaveformResult<Self> {
        if capacity == 0 {
            return Err(WaveformError::InvalidConfig(
                "cache capacity must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(CacheInner {
                loader,
                capacity: AtomicUsize::new(capacity),
                last_chunk,
                entries: Mutex::new(Entries::default()),
                counters: Counters::default(),
                closed: AtomicBool::new(false),
                pending: Mutex::new(0),
                idle: Condvar::new(),
            }),
            pool,
        })
    }

    /// Get a chunk, rendering it on this thread if it is not cached
    ///
    /// Schedules the neighbouring chunks at the same resolution afterwards.
    pub fn get_chunk(&self, key: ChunkKey) -> WaveformResult<RenderedChunk> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(WaveformError::NoAudioLoaded);
        }
        if key.chunk_number > self.inner.last_chunk {
            return Err(WaveformError::ChunkOutOfRange {
                chunk: key.chunk_number,
                last: self.inner.last_chunk,
            });
        }

        let (slot, found) = self.inner.slot(key);
        if found {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("[WAVEFORM] Cache hit for chunk {}", key.chunk_number);
        } else {
            self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            log::debug!("[WAVEFORM] Cache miss for chunk {}", key.chunk_number);
        }

        let result = self.inner.resolve(key, &slot);
        self.prefetch_adjacent(key);
        result
    }

    /// Chunk numbers that a lookup of `chunk_number` prefetches
    pub fn adjacent_chunks(&self, chunk_number: u32) -> Vec<u32> {
        let mut adjacent = Vec::with_capacity(2);
        if chunk_number > 0 {
            adjacent.push(chunk_number - 1);
        }
        if chunk_number < self.inner.last_chunk {
            adjacent.push(chunk_number + 1);
        }
        adjacent
    }

    fn prefetch_adjacent(&self, key: ChunkKey) {
        for neighbour in self.adjacent_chunks(key.chunk_number) {
            let neighbour_key = key.with_chunk(neighbour);
            if self.contains(&neighbour_key) {
                continue;
            }

            self.inner.counters.prefetches.fetch_add(1, Ordering::Relaxed);
            {
                let mut pending = match self.inner.pending.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *pending += 1;
            }
            log::debug!("[WAVEFORM] Prefetching chunk {}", neighbour);

            let inner = self.inner.clone();
            self.pool.spawn(move || {
                let _guard = JobGuard(inner.clone());
                inner.prefetch(neighbour_key);
            });
        }
    }

    /// Whether `key` has a slot (finished or in flight)
    pub fn contains(&self, key: &ChunkKey) -> bool {
        self.inner.entries().slots.contains_key(key)
    }

    /// Number of slots currently held
    pub fn len(&self) -> usize {
        self.inner.entries().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity.load(Ordering::Acquire)
    }

    /// Raise the capacity to at least `capacity`; never shrinks
    pub fn ensure_capacity(&self, capacity: usize) {
        let previous = self.inner.capacity.fetch_max(capacity, Ordering::AcqRel);
        if capacity > previous {
            log::debug!("[WAVEFORM] Chunk cache capacity {} -> {}", previous, capacity);
        }
    }

    pub fn last_chunk(&self) -> u32 {
        self.inner.last_chunk
    }

    /// Drop every entry; in-flight renders finish but are not looked at again
    pub fn clear(&self) {
        let mut entries = self.inner.entries();
        entries.slots.clear();
        entries.order.clear();
    }

    /// Block until every scheduled prefetch has finished
    pub fn wait_idle(&self) {
        let mut pending = match self.inner.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *pending > 0 {
            pending = match self.inner.idle.wait(pending) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Refuse further lookups, let queued prefetches drain and drop all entries
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.wait_idle();
        self.clear();
        log::debug!("[WAVEFORM] Chunk cache closed: {}", self.stats());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            prefetches: c.prefetches.load(Ordering::Relaxed),
        }
    }
}

/// Build the worker pool used for prefetch renders
pub fn render_pool(threads: usize) -> WaveformResult<Arc<ThreadPool>> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("waveform-render-{}", i))
        .build()
        .map(Arc::new)
        .map_err(|e| WaveformError::InvalidConfig(format!("failed to start render pool: {}", e)))
}
