use std::collections::HashSet;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use scrivo::cache::{
    CacheConfig, ListingCache, ListingKey, METRIC_LISTING_EVICT, METRIC_LISTING_HIT,
    METRIC_LISTING_MISS,
};

#[test]
fn listing_cache_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let cache = ListingCache::new(CacheConfig {
        enabled: true,
        ttl: Duration::from_secs(60),
        capacity: 1,
    });

    assert!(cache.get(&ListingKey::index(1)).is_none());
    cache.put(ListingKey::index(1), "<section>one</section>");
    assert!(cache.get(&ListingKey::index(1)).is_some());
    cache.put(ListingKey::index(2), "<section>two</section>");
    assert!(cache.get(&ListingKey::index(1)).is_none());

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [METRIC_LISTING_HIT, METRIC_LISTING_MISS, METRIC_LISTING_EVICT] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
