//! Bounded duplicate suppression keyed by payload digest.
//!
//! The checker remembers when each payload digest was first seen inside the
//! current window. A repeat within the window is a duplicate; the stored
//! timestamp is not refreshed, so a steady flood of identical payloads is let
//! through once per window. Memory is bounded by an LRU of fixed capacity.

use std::{fmt, num::NonZeroUsize, sync::Arc, time::Duration};

use eel_core::{keys, Clock, Context, Settings};
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Cache capacity used when settings enable dedup without a size.
pub const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

/// Duplicate payload detector.
pub trait DuplicateChecker: Send + Sync + fmt::Debug {
    /// Records `payload` and reports whether it was seen within the window.
    fn is_duplicate(&self, payload: &[u8]) -> bool;

    /// Drops any record of `payload`, so its next sighting is not a duplicate.
    fn forget(&self, payload: &[u8]);

    /// Window length in milliseconds.
    fn ttl(&self) -> u64;
}

/// Dedup parameters derived from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateConfig {
    /// Suppression window.
    pub ttl: Duration,
    /// Number of digests remembered.
    pub capacity: NonZeroUsize,
}

impl DuplicateConfig {
    /// Builds the dedup view of `settings`.
    ///
    /// Returns `None` when `DuplicateTimeout` is zero, which disables
    /// suppression. A zero `DuplicateCacheSize` falls back to
    /// [`DEFAULT_CACHE_SIZE`].
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if settings.duplicate_timeout == 0 {
            return None;
        }
        Some(Self {
            ttl: Duration::from_millis(settings.duplicate_timeout),
            capacity: NonZeroUsize::new(settings.duplicate_cache_size).unwrap_or(DEFAULT_CACHE_SIZE),
        })
    }
}

/// In-memory checker over an LRU of SHA-256 digests.
pub struct LruDuplicateChecker {
    cache: Mutex<LruCache<String, u64>>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl LruDuplicateChecker {
    /// Creates a checker with a window of `ttl_ms` milliseconds.
    pub fn new(ttl_ms: u64, capacity: NonZeroUsize, clock: Arc<dyn Clock>) -> Self {
        Self { cache: Mutex::new(LruCache::new(capacity)), ttl_ms, clock }
    }

    /// Creates a checker from a settings-derived config.
    pub fn from_config(config: DuplicateConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl_ms = u64::try_from(config.ttl.as_millis()).unwrap_or(u64::MAX);
        Self::new(ttl_ms, config.capacity, clock)
    }

    /// Number of digests currently held.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether no digest is held.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

/// Lowercase hex SHA-256 of `payload`.
pub fn payload_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

impl DuplicateChecker for LruDuplicateChecker {
    fn is_duplicate(&self, payload: &[u8]) -> bool {
        if self.ttl_ms == 0 {
            return false;
        }
        let digest = payload_digest(payload);
        let window_ns = self.ttl_ms.saturating_mul(1_000_000);

        // Lookup and insert share one critical section so concurrent
        // identical payloads see exactly one `false`.
        let mut cache = self.cache.lock();
        let now = self.clock.now_ns();
        if let Some(&first_seen) = cache.get(&digest) {
            if now.saturating_sub(first_seen) < window_ns {
                return true;
            }
        }
        cache.put(digest, now);
        false
    }

    fn forget(&self, payload: &[u8]) {
        self.cache.lock().pop(&payload_digest(payload));
    }

    fn ttl(&self) -> u64 {
        self.ttl_ms
    }
}

impl fmt::Debug for LruDuplicateChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("LruDuplicateChecker")
            .field("ttl_ms", &self.ttl_ms)
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

/// Registers the process duplicate checker on `ctx`.
pub fn register_duplicate_checker(ctx: &Context, checker: Arc<dyn DuplicateChecker>) {
    ctx.put_config(keys::DUPLICATE_CHECKER, Arc::new(checker));
}

/// Duplicate checker registered on `ctx`, if any.
pub fn duplicate_checker(ctx: &Context) -> Option<Arc<dyn DuplicateChecker>> {
    ctx.config::<Arc<dyn DuplicateChecker>>(keys::DUPLICATE_CHECKER).map(|checker| Arc::clone(&*checker))
}
