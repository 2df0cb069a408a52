//! LRU cache of fixed-size byte blocks of a remote file.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// LRU cache keyed by block index.
pub struct BlockCache {
    inner: LruCache<u64, Arc<Vec<u8>>>,
}

impl BlockCache {
    /// Create a cache holding up to `capacity` blocks (at least one).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    /// Get a cached block, marking it most recently used.
    pub fn get(&mut self, block: u64) -> Option<Arc<Vec<u8>>> {
        self.inner.get(&block).cloned()
    }

    pub fn contains(&self, block: u64) -> bool {
        self.inner.contains(&block)
    }

    pub fn insert(&mut self, block: u64, data: Vec<u8>) -> Arc<Vec<u8>> {
        let data = Arc::new(data);
        self.inner.put(block, Arc::clone(&data));
        data
    }

    /// Number of blocks currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
