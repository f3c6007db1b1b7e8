//! Metric names emitted by the settings caches.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

pub const METRIC_CACHE_HIT: &str = "scoped_settings_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "scoped_settings_cache_miss_total";
pub const METRIC_STORE_FETCH: &str = "scoped_settings_store_fetch_total";
pub const METRIC_STORE_FETCH_MS: &str = "scoped_settings_store_fetch_ms";
pub const METRIC_LIVE_CONTEXTS: &str = "scoped_settings_live_contexts";

/// Register descriptions for every metric above with the installed recorder.
pub fn describe() {
    describe_counter!(
        METRIC_CACHE_HIT,
        Unit::Count,
        "Settings lookups served from a memo slot, labelled by cache layer."
    );
    describe_counter!(
        METRIC_CACHE_MISS,
        Unit::Count,
        "Settings lookups that had to initialise a memo slot, labelled by cache layer."
    );
    describe_counter!(
        METRIC_STORE_FETCH,
        Unit::Count,
        "Get-or-create round trips to the settings store, labelled by scope."
    );
    describe_histogram!(
        METRIC_STORE_FETCH_MS,
        Unit::Milliseconds,
        "Settings store get-or-create latency in milliseconds."
    );
    describe_gauge!(
        METRIC_LIVE_CONTEXTS,
        Unit::Count,
        "Render contexts currently holding a settings cache."
    );
}
