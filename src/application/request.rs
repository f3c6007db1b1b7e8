//! Per-request resolution cache.
//!
//! A [`RequestScope`] is created once per incoming request and passed
//! explicitly to every resolution made on its behalf. Its slots are keyed by
//! the setting type's cache attribute name (`_namespace.typename`), so every
//! casing of a key lands in the same slot.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use crate::application::adapter::{StoreScope, get_or_create};
use crate::application::error::SettingsError;
use crate::application::instance::SettingInstance;
use crate::application::registry::SettingType;
use crate::application::service::Backends;
use crate::cache::MemoMap;
use crate::domain::entities::SiteRecord;
use crate::domain::keys::NaturalKey;
use crate::domain::sites::RequestInfo;
use crate::domain::types::ScopeKind;

const REQUEST_LAYER: &str = "request";

/// Resolution cache bound to one request.
///
/// Cloning is cheap and every clone shares the same slots.
#[derive(Clone)]
pub struct RequestScope {
    state: Arc<RequestState>,
}

struct RequestState {
    request: RequestInfo,
    backends: Arc<Backends>,
    site: OnceCell<SiteRecord>,
    default_site: OnceCell<SiteRecord>,
    slots: MemoMap<String, Arc<SettingInstance>>,
    default_tenant_slots: MemoMap<String, Arc<SettingInstance>>,
}

impl RequestScope {
    pub(crate) fn new(request: RequestInfo, backends: Arc<Backends>) -> Self {
        Self {
            state: Arc::new(RequestState {
                request,
                backends,
                site: OnceCell::new(),
                default_site: OnceCell::new(),
                slots: MemoMap::new(REQUEST_LAYER),
                default_tenant_slots: MemoMap::new(REQUEST_LAYER),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.state.request.id()
    }

    pub fn request(&self) -> &RequestInfo {
        &self.state.request
    }

    /// Site serving this request. The resolver is consulted at most once.
    pub async fn site(&self) -> Result<&SiteRecord, SettingsError> {
        let state = &self.state;
        state
            .site
            .get_or_try_init(|| async move {
                let found = state.backends.sites.find_for_request(&state.request).await?;
                let site = found.ok_or_else(|| SettingsError::SiteNotFound {
                    host: state.request.hostname().to_string(),
                })?;
                debug!(
                    request = %state.request.id(),
                    host = state.request.hostname(),
                    port = state.request.port(),
                    site = %site.id,
                    "matched site for request"
                );
                Ok::<_, SettingsError>(site)
            })
            .await
    }

    /// Deployment default site, looked up at most once for this request.
    pub async fn default_site(&self) -> Result<&SiteRecord, SettingsError> {
        self.state
            .default_site
            .get_or_try_init(|| self.state.backends.default_site())
            .await
    }

    /// Resolve `setting` for this request.
    ///
    /// Site-scoped types are fetched for the request's site; global and
    /// generic types use the type's singleton record.
    pub async fn resolve(
        &self,
        setting: &Arc<SettingType>,
    ) -> Result<Arc<SettingInstance>, SettingsError> {
        let store = self.state.backends.store.as_ref();
        self.state
            .slots
            .get_or_try_init(setting.key().cache_attr_name(), || async move {
                match setting.scope() {
                    ScopeKind::Site => {
                        let site = self.site().await?;
                        get_or_create(store, setting, StoreScope::Site(site)).await
                    }
                    ScopeKind::Global | ScopeKind::Generic => {
                        get_or_create(store, setting, StoreScope::Singleton).await
                    }
                }
            })
            .await
    }

    /// Resolve `setting` against the default site instead of the request's.
    ///
    /// Only site-scoped types are affected; singletons resolve as usual.
    pub async fn resolve_for_default_site(
        &self,
        setting: &Arc<SettingType>,
    ) -> Result<Arc<SettingInstance>, SettingsError> {
        if !setting.scope().is_site_aware() {
            return self.resolve(setting).await;
        }
        let store = self.state.backends.store.as_ref();
        self.state
            .default_tenant_slots
            .get_or_try_init(setting.key().cache_attr_name(), || async move {
                let site = self.default_site().await?;
                get_or_create(store, setting, StoreScope::Site(site)).await
            })
            .await
    }

    /// Instance already cached for `key`, if any. Never touches the store.
    pub fn cached(&self, key: &NaturalKey) -> Option<Arc<SettingInstance>> {
        self.state.slots.get(&key.cache_attr_name())
    }

    /// Number of settings resolved so far in this request.
    pub fn cached_len(&self) -> usize {
        self.state.slots.len() + self.state.default_tenant_slots.len()
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("request", &self.state.request)
            .field("site", &self.state.site.get().map(|site| site.id))
            .finish_non_exhaustive()
    }
}
