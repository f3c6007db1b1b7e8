//! Render-context caches.
//!
//! A [`RenderContext`] is a guard for one template evaluation. Its cache is
//! created lazily on the first resolution and released when the guard drops.
//! The shared [`ContextCaches`] registry only maps a context id to its cache;
//! it never holds the context or the request the context carries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};
use metrics::gauge;
use tokio::sync::OnceCell;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::application::adapter::{StoreScope, get_or_create};
use crate::application::error::SettingsError;
use crate::application::instance::SettingInstance;
use crate::application::registry::SettingType;
use crate::application::request::RequestScope;
use crate::application::service::{Backends, ResolveOptions};
use crate::cache::MemoMap;
use crate::cache::metrics::METRIC_LIVE_CONTEXTS;
use crate::domain::entities::SiteRecord;
use crate::domain::keys::NaturalKey;
use crate::domain::types::ScopeKind;

const CONTEXT_LAYER: &str = "context";

/// Identity of a render context within one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// First-level partition of a context cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Partition {
    /// Site-scoped types, per resolved site.
    Site(Uuid),
    /// Singleton types, per ambient request.
    Request(Uuid),
    /// Singleton types resolved with no request under the default-tenant
    /// override.
    Deployment,
}

pub(crate) struct ContextCache {
    default_site: OnceCell<SiteRecord>,
    instances: MemoMap<(Partition, NaturalKey), Arc<SettingInstance>>,
}

impl ContextCache {
    fn new() -> Self {
        Self {
            default_site: OnceCell::new(),
            instances: MemoMap::new(CONTEXT_LAYER),
        }
    }
}

/// Registry of live context caches, shared by every context of a service.
pub(crate) struct ContextCaches {
    caches: DashMap<ContextId, Arc<ContextCache>>,
    next_id: AtomicU64,
}

impl ContextCaches {
    pub(crate) fn new() -> Self {
        Self {
            caches: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate(&self) -> ContextId {
        ContextId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn get_or_create(&self, id: ContextId) -> Arc<ContextCache> {
        match self.caches.entry(id) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let cache = Arc::new(ContextCache::new());
                entry.insert(Arc::clone(&cache));
                gauge!(METRIC_LIVE_CONTEXTS).increment(1.0);
                cache
            }
        }
    }

    fn release(&self, id: ContextId) {
        if let Some((_, cache)) = self.caches.remove(&id) {
            gauge!(METRIC_LIVE_CONTEXTS).decrement(1.0);
            trace!(context = %id, entries = cache.instances.len(), "released context cache");
        }
    }

    pub(crate) fn live(&self) -> usize {
        self.caches.len()
    }
}

/// One template evaluation environment, optionally carrying a request.
///
/// Contexts never share a cache. Singleton types resolved through a shared
/// request still come back from that request's slots.
pub struct RenderContext {
    id: ContextId,
    request: Option<RequestScope>,
    caches: Arc<ContextCaches>,
    backends: Arc<Backends>,
}

impl RenderContext {
    pub(crate) fn new(
        request: Option<RequestScope>,
        caches: Arc<ContextCaches>,
        backends: Arc<Backends>,
    ) -> Self {
        let id = caches.allocate();
        Self {
            id,
            request,
            caches,
            backends,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Ambient request, if the context carries one.
    pub fn request(&self) -> Option<&RequestScope> {
        self.request.as_ref()
    }

    /// Number of instances cached by this context so far.
    pub fn cached_len(&self) -> usize {
        self.caches
            .caches
            .get(&self.id)
            .map(|cache| cache.instances.len())
            .unwrap_or(0)
    }

    /// Resolve `setting` within this context.
    ///
    /// Site-scoped types need the ambient request's site, or the default site
    /// when `use_default_tenant` is set. Singleton types are cached per
    /// ambient request and go through the request's own cache. Without a
    /// request they resolve only under the default-tenant override.
    pub async fn resolve(
        &self,
        setting: &Arc<SettingType>,
        options: ResolveOptions,
    ) -> Result<Arc<SettingInstance>, SettingsError> {
        let cache = self.caches.get_or_create(self.id);
        let store = self.backends.store.as_ref();

        match setting.scope() {
            ScopeKind::Site => {
                let site = if options.use_default_tenant {
                    cache
                        .default_site
                        .get_or_try_init(|| self.backends.default_site())
                        .await?
                } else if let Some(request) = &self.request {
                    request.site().await?
                } else {
                    return Err(SettingsError::NoRequestInContext);
                };
                let partition = Partition::Site(site.id);
                cache
                    .instances
                    .get_or_try_init((partition, setting.key().clone()), || async move {
                        get_or_create(store, setting, StoreScope::Site(site)).await
                    })
                    .await
            }
            ScopeKind::Global | ScopeKind::Generic => match &self.request {
                Some(request) => {
                    let partition = Partition::Request(request.id());
                    cache
                        .instances
                        .get_or_try_init((partition, setting.key().clone()), || {
                            request.resolve(setting)
                        })
                        .await
                }
                None if options.use_default_tenant => {
                    debug!(
                        context = %self.id,
                        setting = %setting.key(),
                        "resolving singleton without a request"
                    );
                    cache
                        .instances
                        .get_or_try_init((Partition::Deployment, setting.key().clone()), || {
                            get_or_create(store, setting, StoreScope::Singleton)
                        })
                        .await
                }
                None => Err(SettingsError::NoRequestInContext),
            },
        }
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        self.caches.release(self.id);
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("id", &self.id)
            .field("request", &self.request.as_ref().map(RequestScope::id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sites::RequestInfo;
    use crate::domain::types::ScopeIdentity;
    use crate::infra::memory::{InMemorySettingStore, StaticSiteResolver};

    struct Harness {
        caches: Arc<ContextCaches>,
        backends: Arc<Backends>,
        store: Arc<InMemorySettingStore>,
        default_site: SiteRecord,
        other_site: SiteRecord,
    }

    impl Harness {
        fn new() -> Self {
            let default_site = SiteRecord::new("localhost", 80).as_default();
            let other_site = SiteRecord::new("other", 80);
            let store = Arc::new(InMemorySettingStore::new());
            let sites = Arc::new(StaticSiteResolver::new(vec![
                default_site.clone(),
                other_site.clone(),
            ]));
            Self {
                caches: Arc::new(ContextCaches::new()),
                backends: Arc::new(Backends::new(store.clone(), sites)),
                store,
                default_site,
                other_site,
            }
        }

        fn request(&self, host: &str) -> RequestScope {
            RequestScope::new(RequestInfo::new(host, 80), Arc::clone(&self.backends))
        }

        fn context(&self, request: Option<RequestScope>) -> RenderContext {
            RenderContext::new(request, Arc::clone(&self.caches), Arc::clone(&self.backends))
        }
    }

    fn setting(type_name: &str, scope: ScopeKind) -> Arc<SettingType> {
        Arc::new(SettingType::new("tests", type_name, scope))
    }

    #[tokio::test]
    async fn cache_is_created_lazily_and_released_on_drop() {
        let harness = Harness::new();
        let context = harness.context(None);
        assert_eq!(harness.caches.live(), 0);
        assert_eq!(context.cached_len(), 0);

        context
            .resolve(&setting("TestSetting", ScopeKind::Site), ResolveOptions::default_tenant())
            .await
            .expect("default site instance");
        assert_eq!(harness.caches.live(), 1);
        assert_eq!(context.cached_len(), 1);

        drop(context);
        assert_eq!(harness.caches.live(), 0);
    }

    #[tokio::test]
    async fn release_only_removes_the_named_context() {
        let harness = Harness::new();
        let first = harness.context(None);
        let second = harness.context(None);
        let global = setting("ImportantPages", ScopeKind::Global);
        for context in [&first, &second] {
            context
                .resolve(&global, ResolveOptions::default_tenant())
                .await
                .expect("singleton");
        }
        assert_eq!(harness.caches.live(), 2);

        harness.caches.release(ContextId(u64::MAX));
        assert_eq!(harness.caches.live(), 2);

        harness.caches.release(first.id());
        assert_eq!(harness.caches.live(), 1);
        assert_eq!(second.cached_len(), 1);

        // The guard releasing an already released id is a no-op.
        drop(first);
        assert_eq!(harness.caches.live(), 1);
        drop(second);
        assert_eq!(harness.caches.live(), 0);
    }

    #[tokio::test]
    async fn request_site_and_default_site_are_partitioned() {
        let harness = Harness::new();
        let context = harness.context(Some(harness.request("other")));
        let site_setting = setting("TestSetting", ScopeKind::Site);

        let own = context
            .resolve(&site_setting, ResolveOptions::default())
            .await
            .expect("request site");
        let default = context
            .resolve(&site_setting, ResolveOptions::default_tenant())
            .await
            .expect("default site");

        assert_eq!(own.scope(), ScopeIdentity::Site(harness.other_site.id));
        assert_eq!(default.scope(), ScopeIdentity::Site(harness.default_site.id));
        assert_eq!(context.cached_len(), 2);

        let own_again = context
            .resolve(&site_setting, ResolveOptions::default())
            .await
            .expect("request site again");
        let default_again = context
            .resolve(&site_setting, ResolveOptions::default_tenant())
            .await
            .expect("default site again");
        assert!(Arc::ptr_eq(&own, &own_again));
        assert!(Arc::ptr_eq(&default, &default_again));
        assert_eq!(harness.store.stats().site_lookups, 2);
    }

    #[tokio::test]
    async fn singletons_come_from_the_request_slots() {
        let harness = Harness::new();
        let request = harness.request("localhost");
        let context = harness.context(Some(request.clone()));

        for scope in [ScopeKind::Generic, ScopeKind::Global] {
            let singleton = setting(&format!("{scope}Setting"), scope);
            let via_context = context
                .resolve(&singleton, ResolveOptions::default())
                .await
                .expect("context");
            let via_request = request.resolve(&singleton).await.expect("request");
            assert!(Arc::ptr_eq(&via_context, &via_request), "{scope}");
            assert_eq!(via_context.scope(), ScopeIdentity::Singleton);
        }
        assert_eq!(harness.store.stats().singleton_lookups, 2);
    }

    #[tokio::test]
    async fn singletons_without_request_need_the_override() {
        let harness = Harness::new();
        let context = harness.context(None);

        for scope in [ScopeKind::Generic, ScopeKind::Global] {
            let singleton = setting(&format!("{scope}Setting"), scope);
            let err = context
                .resolve(&singleton, ResolveOptions::default())
                .await
                .expect_err("no request");
            assert!(matches!(err, SettingsError::NoRequestInContext), "{scope}");

            let first = context
                .resolve(&singleton, ResolveOptions::default_tenant())
                .await
                .expect("deployment singleton");
            let again = context
                .resolve(&singleton, ResolveOptions::default_tenant())
                .await
                .expect("cached singleton");
            assert!(Arc::ptr_eq(&first, &again), "{scope}");
        }
        assert_eq!(harness.store.stats().singleton_lookups, 2);
    }
}
