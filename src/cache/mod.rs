//! Listing cache.
//!
//! The post-list fragment of the global listing is rendered once and reused
//! for a short TTL. User-specific page chrome is never cached.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 20
//! capacity = 64
//! ```

mod config;
mod lock;
mod store;

pub use config::CacheConfig;
pub use store::{ListingCache, ListingKey};

pub const METRIC_LISTING_HIT: &str = "scrivo_cache_listing_hit_total";
pub const METRIC_LISTING_MISS: &str = "scrivo_cache_listing_miss_total";
pub const METRIC_LISTING_EVICT: &str = "scrivo_cache_listing_evict_total";
