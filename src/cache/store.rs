//! Process-wide store for rendered listing fragments.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::{METRIC_LISTING_EVICT, METRIC_LISTING_HIT, METRIC_LISTING_MISS};

const SOURCE: &str = "cache::store";

/// Identifies one cached fragment: the view that produced it and the page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub view: &'static str,
    pub page: u64,
}

impl ListingKey {
    pub const INDEX: &'static str = "index";

    pub fn index(page: u64) -> Self {
        Self {
            view: Self::INDEX,
            page,
        }
    }
}

struct Entry {
    html: Arc<str>,
    stored_at: Instant,
}

/// Short-lived LRU cache of rendered post-list fragments.
///
/// Entries expire `ttl` after insertion. Writes elsewhere never invalidate
/// entries; only expiry and [`ListingCache::clear`] do.
pub struct ListingCache {
    config: CacheConfig,
    entries: Mutex<LruCache<ListingKey, Entry>>,
}

impl ListingCache {
    pub fn new(config: CacheConfig) -> Self {
        let entries = Mutex::new(LruCache::new(config.capacity_non_zero()));
        Self { config, entries }
    }

    pub fn get(&self, key: &ListingKey) -> Option<Arc<str>> {
        if !self.config.enabled {
            return None;
        }

        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let hit = match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.config.ttl => {
                Some(Arc::clone(&entry.html))
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        if hit.is_some() {
            counter!(METRIC_LISTING_HIT, "view" => key.view).increment(1);
        } else {
            counter!(METRIC_LISTING_MISS, "view" => key.view).increment(1);
        }
        hit
    }

    pub fn put(&self, key: ListingKey, html: impl Into<Arc<str>>) {
        if !self.config.enabled {
            return;
        }

        let entry = Entry {
            html: html.into(),
            stored_at: Instant::now(),
        };
        let evicted = mutex_lock(&self.entries, SOURCE, "put").push(key.clone(), entry);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_LISTING_EVICT, "view" => evicted_key.view).increment(1);
        }
    }

    /// Drop every cached fragment.
    pub fn clear(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "clear");
        let dropped = entries.len();
        entries.clear();
        debug!(target = "scrivo::cache", dropped, "listing cache cleared");
        dropped
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
