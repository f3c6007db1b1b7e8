use std::sync::{Arc, OnceLock};

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use scoped_settings::application::registry::{SettingRegistry, SettingType};
use scoped_settings::application::service::{ResolveOptions, SettingsService};
use scoped_settings::cache::metrics::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_LIVE_CONTEXTS, METRIC_STORE_FETCH,
    METRIC_STORE_FETCH_MS,
};
use scoped_settings::domain::entities::{SettingRecord, SiteRecord};
use scoped_settings::domain::sites::RequestInfo;
use scoped_settings::domain::types::ScopeKind;
use scoped_settings::infra::memory::{InMemorySettingStore, StaticPageUrls, StaticSiteResolver};
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

fn counter(name: &str, label: (&str, &str)) -> u64 {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label.0 && l.value() == label.1)
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

fn gauge(name: &str) -> Option<f64> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.key().name() == name)
        .and_then(|(_, _, _, value)| match value {
            DebugValue::Gauge(level) => Some(level.into_inner()),
            _ => None,
        })
}

fn metric_names() -> Vec<String> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect()
}

fn service(store: InMemorySettingStore) -> SettingsService {
    let registry = SettingRegistry::from_definitions([
        SettingType::new("tests", "TestSetting", ScopeKind::Site),
        SettingType::new("tests", "TestGenericSetting", ScopeKind::Generic),
        SettingType::new("tests", "ImportantPages", ScopeKind::Global),
    ])
    .expect("valid registry");
    let sites = StaticSiteResolver::new(vec![SiteRecord::new("localhost", 80).as_default()]);
    SettingsService::new(Arc::new(registry), Arc::new(store), Arc::new(sites))
}

#[tokio::test]
#[serial]
async fn request_layer_counts_hits_and_misses() {
    let service = service(InMemorySettingStore::new());
    let request = service.begin_request(RequestInfo::new("localhost", 80));

    let misses = counter(METRIC_CACHE_MISS, ("layer", "request"));
    let hits = counter(METRIC_CACHE_HIT, ("layer", "request"));
    let fetches = counter(METRIC_STORE_FETCH, ("scope", "singleton"));

    for _ in 0..3 {
        service
            .resolve(
                "tests.TestGenericSetting",
                &request,
                ResolveOptions::default(),
            )
            .await
            .expect("resolve");
    }

    assert_eq!(counter(METRIC_CACHE_MISS, ("layer", "request")) - misses, 1);
    assert_eq!(counter(METRIC_CACHE_HIT, ("layer", "request")) - hits, 2);
    assert_eq!(counter(METRIC_STORE_FETCH, ("scope", "singleton")) - fetches, 1);
    assert!(
        metric_names()
            .iter()
            .any(|name| name == METRIC_STORE_FETCH_MS)
    );
}

#[tokio::test]
#[serial]
async fn context_layer_tracks_live_contexts() {
    let service = service(InMemorySettingStore::new());
    let request = service.begin_request(RequestInfo::new("localhost", 80));

    let misses = counter(METRIC_CACHE_MISS, ("layer", "context"));
    let hits = counter(METRIC_CACHE_HIT, ("layer", "context"));
    let fetches = counter(METRIC_STORE_FETCH, ("scope", "site"));
    let live = gauge(METRIC_LIVE_CONTEXTS).unwrap_or(0.0);

    let context = service.render_context(Some(request.clone()));
    for _ in 0..2 {
        service
            .resolve("tests.TestSetting", &context, ResolveOptions::default())
            .await
            .expect("resolve");
    }

    assert_eq!(counter(METRIC_CACHE_MISS, ("layer", "context")) - misses, 1);
    assert_eq!(counter(METRIC_CACHE_HIT, ("layer", "context")) - hits, 1);
    assert_eq!(counter(METRIC_STORE_FETCH, ("scope", "site")) - fetches, 1);
    assert_eq!(gauge(METRIC_LIVE_CONTEXTS), Some(live + 1.0));

    let overlapping = service.render_context(Some(request));
    service
        .resolve("tests.TestSetting", &overlapping, ResolveOptions::default())
        .await
        .expect("resolve in second context");
    assert_eq!(gauge(METRIC_LIVE_CONTEXTS), Some(live + 2.0));

    drop(context);
    assert_eq!(gauge(METRIC_LIVE_CONTEXTS), Some(live + 1.0));
    drop(overlapping);
    assert_eq!(gauge(METRIC_LIVE_CONTEXTS), Some(live));
}

#[tokio::test]
#[serial]
async fn page_url_layer_is_labelled() {
    let page = Uuid::new_v4();
    let store = InMemorySettingStore::with_records([SettingRecord::new(
        "tests",
        "ImportantPages",
        None,
        json!({ "sign_up_page": { "page_id": page.to_string() } })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    )])
    .expect("seed store");
    let service = service(store);
    let pages = StaticPageUrls::new().with_page(page, "/sign-up/");
    let request = service.begin_request(RequestInfo::new("localhost", 80));
    let instance = service
        .resolve("tests.ImportantPages", &request, ResolveOptions::default())
        .await
        .expect("resolve");

    let misses = counter(METRIC_CACHE_MISS, ("layer", "page_url"));
    let hits = counter(METRIC_CACHE_HIT, ("layer", "page_url"));
    for _ in 0..2 {
        assert_eq!(
            instance.page_url("sign_up_page", &pages).await.expect("url"),
            "/sign-up/"
        );
    }

    assert_eq!(counter(METRIC_CACHE_MISS, ("layer", "page_url")) - misses, 1);
    assert_eq!(counter(METRIC_CACHE_HIT, ("layer", "page_url")) - hits, 1);
}
