//! Scope-kind dispatch onto the settings store.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::debug;

use crate::application::error::SettingsError;
use crate::application::instance::SettingInstance;
use crate::application::registry::SettingType;
use crate::application::repos::SettingStore;
use crate::cache::metrics::{METRIC_STORE_FETCH, METRIC_STORE_FETCH_MS};
use crate::domain::entities::SiteRecord;
use crate::domain::types::ScopeIdentity;

/// Where a record is fetched from: one site's row, or the type's single row.
#[derive(Debug, Clone, Copy)]
pub(crate) enum StoreScope<'a> {
    Site(&'a SiteRecord),
    Singleton,
}

/// Get-or-create the record backing `setting` within `scope`.
///
/// Store failures propagate unchanged; nothing is retried here.
pub(crate) async fn get_or_create(
    store: &dyn SettingStore,
    setting: &Arc<SettingType>,
    scope: StoreScope<'_>,
) -> Result<Arc<SettingInstance>, SettingsError> {
    let started = Instant::now();
    let (identity, record) = match scope {
        StoreScope::Site(site) => (
            ScopeIdentity::Site(site.id),
            store.get_or_create_for_site(setting, site).await?,
        ),
        StoreScope::Singleton => (
            ScopeIdentity::Singleton,
            store.get_or_create_singleton(setting).await?,
        ),
    };

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    counter!(METRIC_STORE_FETCH, "scope" => identity.label()).increment(1);
    histogram!(METRIC_STORE_FETCH_MS).record(elapsed_ms);
    debug!(
        setting = %setting.key(),
        scope = %identity,
        record = %record.id,
        elapsed_ms,
        "fetched settings record"
    );

    Ok(Arc::new(SettingInstance::new(
        Arc::clone(setting),
        identity,
        record,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ScopeKind;
    use crate::infra::memory::InMemorySettingStore;

    #[tokio::test]
    async fn site_scope_fetches_the_site_row() {
        let store = InMemorySettingStore::new();
        let setting = Arc::new(SettingType::new("tests", "TestSetting", ScopeKind::Site));
        let site = SiteRecord::new("localhost", 80);

        let instance = get_or_create(&store, &setting, StoreScope::Site(&site))
            .await
            .expect("site instance");

        assert_eq!(instance.scope(), ScopeIdentity::Site(site.id));
        assert_eq!(instance.record().site_id, Some(site.id));
        let stats = store.stats();
        assert_eq!((stats.site_lookups, stats.singleton_lookups), (1, 0));
    }

    #[tokio::test]
    async fn singleton_scope_fetches_the_siteless_row() {
        let store = InMemorySettingStore::new();
        let setting = Arc::new(SettingType::new("tests", "ImportantPages", ScopeKind::Global));

        let instance = get_or_create(&store, &setting, StoreScope::Singleton)
            .await
            .expect("singleton instance");

        assert_eq!(instance.scope(), ScopeIdentity::Singleton);
        assert_eq!(instance.record().site_id, None);
        let stats = store.stats();
        assert_eq!((stats.site_lookups, stats.singleton_lookups), (0, 1));
    }

    #[tokio::test]
    async fn every_call_goes_to_the_store() {
        let store = InMemorySettingStore::new();
        let setting = Arc::new(SettingType::new("tests", "TestGenericSetting", ScopeKind::Generic));

        let first = get_or_create(&store, &setting, StoreScope::Singleton)
            .await
            .expect("first");
        let second = get_or_create(&store, &setting, StoreScope::Singleton)
            .await
            .expect("second");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.id(), second.id());
        assert_eq!(store.stats().singleton_lookups, 2);
        assert_eq!(store.stats().created, 1);
    }
}
