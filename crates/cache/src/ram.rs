//! RAM bitmap cache with LRU eviction
//!
//! Holds rasterized annotation bitmaps so expensive annotations are not
//! re-stroked on every frame. Eviction is least-recently-used, bounded by
//! both an entry count and a byte budget. The cache is purely an
//! optimization: a miss only costs a re-render.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A cached raster
///
/// Pixels are premultiplied RGBA, row-major, top row first. `origin_x` and
/// `origin_y` place the bitmap's top-left pixel on the target surface.
#[derive(Debug, Clone)]
pub struct CachedBitmap {
    pub pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub origin_x: i32,
    pub origin_y: i32,
}

impl CachedBitmap {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, origin_x: i32, origin_y: i32) -> Self {
        Self { pixels: pixels.into(), width, height, origin_x, origin_y }
    }

    /// Get the memory size of this bitmap in bytes
    pub fn memory_size(&self) -> usize {
        self.pixels.len()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of bitmaps currently in cache
    pub entry_count: usize,

    /// Total memory used by cached bitmaps (bytes)
    pub memory_used: usize,

    /// Maximum memory allowed (bytes)
    pub memory_limit: usize,

    /// Maximum number of entries allowed
    pub entry_limit: usize,

    pub hits: u64,
    pub misses: u64,

    /// Number of bitmaps evicted to stay within limits
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

/// Internal cache state
struct CacheState<K> {
    entries: HashMap<K, CachedBitmap>,

    /// LRU queue (most recently used at back, least recently used at front)
    lru_queue: VecDeque<K>,

    memory_used: usize,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone> CacheState<K> {
    fn new(entry_limit: usize, memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            stats: CacheStats { entry_limit, memory_limit, ..Default::default() },
        }
    }

    /// Move a key to the back of the LRU queue (mark as most recently used)
    fn touch(&mut self, key: &K) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.clone());
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }

    fn take(&mut self, key: &K) -> Option<CachedBitmap> {
        let bitmap = self.entries.remove(key)?;
        self.memory_used = self.memory_used.saturating_sub(bitmap.memory_size());
        self.lru_queue.retain(|k| k != key);
        self.sync_stats();
        Some(bitmap)
    }

    /// Evict the least recently used bitmap
    fn evict_lru(&mut self) -> Option<CachedBitmap> {
        let key = self.lru_queue.pop_front()?;
        let bitmap = self.entries.remove(&key)?;
        self.memory_used = self.memory_used.saturating_sub(bitmap.memory_size());
        self.stats.evictions += 1;
        self.sync_stats();
        Some(bitmap)
    }

    /// Evict until one more entry of `required_size` bytes fits
    fn evict_to_fit(&mut self, required_size: usize) {
        while !self.entries.is_empty()
            && (self.memory_used + required_size > self.stats.memory_limit
                || self.entries.len() + 1 > self.stats.entry_limit)
        {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    /// Evict until current contents are within the limits
    fn evict_to_limits(&mut self) {
        while self.memory_used > self.stats.memory_limit
            || self.entries.len() > self.stats.entry_limit
        {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }
}

/// Thread-safe LRU cache of rendered bitmaps
///
/// # Example
///
/// ```
/// use pdf_markup_cache::{BitmapCache, CachedBitmap};
///
/// let cache: BitmapCache<u64> = BitmapCache::new(16, 1024 * 1024);
/// cache.put(7, CachedBitmap::new(vec![0u8; 64 * 64 * 4], 64, 64, 0, 0));
///
/// if let Some(bitmap) = cache.get(&7) {
///     println!("Cache hit! {}x{}", bitmap.width, bitmap.height);
/// }
/// println!("Hit rate: {:.2}%", cache.stats().hit_rate() * 100.0);
/// ```
pub struct BitmapCache<K> {
    state: Arc<Mutex<CacheState<K>>>,
}

impl<K> Clone for BitmapCache<K> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<K: Eq + Hash + Clone> BitmapCache<K> {
    /// Create a cache bounded by `entry_limit` bitmaps and `memory_limit` bytes
    pub fn new(entry_limit: usize, memory_limit: usize) -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new(entry_limit, memory_limit))) }
    }

    /// Create a cache from a [`crate::CacheConfig`]
    pub fn from_config(config: &crate::CacheConfig) -> Self {
        Self::new(config.max_entries, config.max_bytes)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K>> {
        // The state is updated field by field with no invariant spanning a
        // panic point, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a bitmap, evicting least recently used entries to make room
    ///
    /// A bitmap larger than the whole byte budget is not stored.
    pub fn put(&self, key: K, bitmap: CachedBitmap) {
        let mut state = self.lock();
        let size = bitmap.memory_size();

        state.take(&key);
        if size > state.stats.memory_limit || state.stats.entry_limit == 0 {
            tracing::debug!(size, "bitmap exceeds cache budget, not cached");
            return;
        }

        state.evict_to_fit(size);
        state.memory_used += size;
        state.entries.insert(key.clone(), bitmap);
        state.touch(&key);
        state.sync_stats();
    }

    /// Retrieve a bitmap, updating LRU order and hit/miss statistics
    pub fn get(&self, key: &K) -> Option<CachedBitmap> {
        let mut state = self.lock();
        match state.entries.get(key).cloned() {
            Some(bitmap) => {
                state.touch(key);
                state.stats.hits += 1;
                Some(bitmap)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Check presence without updating LRU order or statistics
    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<CachedBitmap> {
        self.lock().take(key)
    }

    /// Drop every entry whose key matches `predicate`
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut state = self.lock();
        let doomed: Vec<K> = state.entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            state.take(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Change both limits, evicting as needed
    pub fn set_limits(&self, entry_limit: usize, memory_limit: usize) {
        let mut state = self.lock();
        state.stats.entry_limit = entry_limit;
        state.stats.memory_limit = memory_limit;
        state.evict_to_limits();
    }

    pub fn memory_used(&self) -> usize {
        self.lock().memory_used
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for BitmapCache<K> {
    fn default() -> Self {
        Self::from_config(&crate::CacheConfig::default())
    }
}
