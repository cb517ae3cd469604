//! Bounded LRU deny-lists for infohashes and peer addresses.
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::infohash::Infohash;

/// A bounded LRU set: membership only, no associated value.
pub struct LruSet<K> {
    inner: Mutex<LruCache<K, ()>>,
}

impl<K: std::hash::Hash + Eq + Clone> LruSet<K> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        LruSet {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn insert(&self, key: K) {
        self.inner.lock().expect("lru set mutex poisoned").put(key, ());
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().expect("lru set mutex poisoned").contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lru set mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two deny-lists named in the data model: infohashes to skip for
/// metadata fetch, and peer addresses to skip for outbound DHT traffic.
pub struct Blacklists {
    pub infohashes: LruSet<Infohash>,
    pub peers: LruSet<SocketAddr>,
}

impl Blacklists {
    pub fn new(capacity: usize) -> Self {
        Blacklists {
            infohashes: LruSet::new(capacity),
            peers: LruSet::new(capacity),
        }
    }
}
