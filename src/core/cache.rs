//! Fragment memoization for the merge engine.
//!
//! The tokenizer owns a `Box<dyn MergeCache>` and consults it before running
//! BPE on a fragment. Two implementations are provided:
//!
//! - [`UnboundedCache`]: grows for the lifetime of the tokenizer and never
//!   evicts. Fragment diversity in natural text is bounded in practice, so
//!   this is the default.
//! - [`LruMergeCache`]: bounded, least-recently-used eviction.
//!
//! Lookups and inserts take the lock separately. Two callers racing on the
//! same fragment may both compute it; the second insert overwrites the first
//! with an identical value.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use rustc_hash::FxHashMap;

/// Default capacity for [`LruMergeCache::default`].
pub const DEFAULT_LRU_CAPACITY: usize = 4096;

/// A `fragment -> symbols` memo shared by all callers of a tokenizer.
///
/// Implementations must tolerate concurrent `get`/`insert` from several
/// threads. A poisoned lock is treated as an empty cache.
pub trait MergeCache: Send + Sync {
    fn get(&self, fragment: &str) -> Option<Vec<String>>;

    fn insert(&self, fragment: String, symbols: Vec<String>);

    fn contains(&self, fragment: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);
}

/// Cache that never evicts.
#[derive(Debug, Default)]
pub struct UnboundedCache {
    entries: Mutex<FxHashMap<String, Vec<String>>>,
}

impl UnboundedCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MergeCache for UnboundedCache {
    fn get(&self, fragment: &str) -> Option<Vec<String>> {
        self.entries.lock().ok()?.get(fragment).cloned()
    }

    fn insert(&self, fragment: String, symbols: Vec<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(fragment, symbols);
        }
    }

    fn contains(&self, fragment: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(fragment))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Bounded cache with least-recently-used eviction.
pub struct LruMergeCache {
    entries: Mutex<LruCache<String, Vec<String>>>,
}

impl LruMergeCache {
    /// Create a cache holding at most `capacity` fragments (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().map(|e| e.cap().get()).unwrap_or(0)
    }
}

impl Default for LruMergeCache {
    fn default() -> Self {
        Self::new(DEFAULT_LRU_CAPACITY)
    }
}

impl MergeCache for LruMergeCache {
    fn get(&self, fragment: &str) -> Option<Vec<String>> {
        self.entries.lock().ok()?.get(fragment).cloned()
    }

    fn insert(&self, fragment: String, symbols: Vec<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(fragment, symbols);
        }
    }

    fn contains(&self, fragment: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains(fragment))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
