//! Process-local cache tier
//!
//! A bounded map from key to [`CacheEntry`]. Freshness is recomputed from the
//! entry's own `stored_at`/`ttl` on every read, so the local tier never
//! depends on the remote store to expire anything.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::CacheEntry;

/// In-memory tier with capacity-based eviction
pub(crate) struct LocalCache {
    entries: HashMap<String, CacheEntry>,
    capacity: usize,
}

impl LocalCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Fresh entry for `key`; expired entries are removed on the way
    pub(crate) fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh_at(now) => Some(entry.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry, evicting when full
    pub(crate) fn insert(&mut self, key: String, entry: CacheEntry, now: DateTime<Utc>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict(now);
        }
        self.entries.insert(key, entry);
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop expired entries; if none were expired, drop the oldest one
    fn evict(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh_at(now));

        if self.entries.len() == before {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                self.entries.remove(&key);
            }
        }

        tracing::trace!(evicted = before - self.entries.len(), "Local cache eviction");
    }
}
