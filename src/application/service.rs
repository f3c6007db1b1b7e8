//! Entry point for resolving settings by dotted key.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use crate::application::context::{ContextCaches, RenderContext};
use crate::application::error::SettingsError;
use crate::application::instance::SettingInstance;
use crate::application::proxy::SettingsProxy;
use crate::application::registry::{SettingRegistry, SettingType};
use crate::application::repos::{SettingStore, SiteResolver};
use crate::application::request::RequestScope;
use crate::domain::entities::SiteRecord;
use crate::domain::keys::{FieldPath, NaturalKey};
use crate::domain::sites::RequestInfo;

/// Collaborators shared by the service and every cache it hands out.
pub(crate) struct Backends {
    pub(crate) store: Arc<dyn SettingStore>,
    pub(crate) sites: Arc<dyn SiteResolver>,
}

impl Backends {
    pub(crate) fn new(store: Arc<dyn SettingStore>, sites: Arc<dyn SiteResolver>) -> Self {
        Self { store, sites }
    }

    pub(crate) async fn default_site(&self) -> Result<SiteRecord, SettingsError> {
        self.sites
            .default_site()
            .await?
            .ok_or(SettingsError::NoDefaultSite)
    }
}

/// Where a resolution is cached: a request or a render context.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Request(&'a RequestScope),
    Context(&'a RenderContext),
}

impl<'a> From<&'a RequestScope> for Target<'a> {
    fn from(scope: &'a RequestScope) -> Self {
        Target::Request(scope)
    }
}

impl<'a> From<&'a RenderContext> for Target<'a> {
    fn from(context: &'a RenderContext) -> Self {
        Target::Context(context)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Resolve site-scoped types for the deployment default site, skipping
    /// the request's own site lookup.
    pub use_default_tenant: bool,
}

impl ResolveOptions {
    pub fn default_tenant() -> Self {
        Self {
            use_default_tenant: true,
        }
    }
}

/// Resolves registered settings through request and render-context caches.
#[derive(Clone)]
pub struct SettingsService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    registry: Arc<SettingRegistry>,
    backends: Arc<Backends>,
    contexts: Arc<ContextCaches>,
}

impl SettingsService {
    pub fn new(
        registry: Arc<SettingRegistry>,
        store: Arc<dyn SettingStore>,
        sites: Arc<dyn SiteResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                registry,
                backends: Arc::new(Backends::new(store, sites)),
                contexts: Arc::new(ContextCaches::new()),
            }),
        }
    }

    pub fn registry(&self) -> &SettingRegistry {
        &self.inner.registry
    }

    /// Look up the type behind a dotted key such as `tests.TestSetting`.
    pub fn lookup(&self, key: &str) -> Result<Arc<SettingType>, SettingsError> {
        let parsed = NaturalKey::parse(key)?;
        self.inner
            .registry
            .get(&parsed)
            .ok_or_else(|| SettingsError::unknown_setting(key))
    }

    pub(crate) fn lookup_key(&self, key: &NaturalKey) -> Result<Arc<SettingType>, SettingsError> {
        self.inner
            .registry
            .get(key)
            .ok_or_else(|| SettingsError::unknown_setting(key.to_string()))
    }

    /// Open the resolution cache for one request.
    pub fn begin_request(&self, request: RequestInfo) -> RequestScope {
        RequestScope::new(request, Arc::clone(&self.inner.backends))
    }

    /// Open a render context. Its cache is released when the context drops.
    pub fn render_context(&self, request: Option<RequestScope>) -> RenderContext {
        RenderContext::new(
            request,
            Arc::clone(&self.inner.contexts),
            Arc::clone(&self.inner.backends),
        )
    }

    /// Resolve a dotted key within `target`.
    #[instrument(skip_all, fields(key = %key, default_tenant = options.use_default_tenant))]
    pub async fn resolve<'a>(
        &self,
        key: &str,
        target: impl Into<Target<'a>>,
        options: ResolveOptions,
    ) -> Result<Arc<SettingInstance>, SettingsError> {
        let setting = self.lookup(key)?;
        self.resolve_type(&setting, target, options).await
    }

    /// Resolve an already looked-up type within `target`.
    pub async fn resolve_type<'a>(
        &self,
        setting: &Arc<SettingType>,
        target: impl Into<Target<'a>>,
        options: ResolveOptions,
    ) -> Result<Arc<SettingInstance>, SettingsError> {
        match target.into() {
            Target::Request(scope) if options.use_default_tenant => {
                scope.resolve_for_default_site(setting).await
            }
            Target::Request(scope) => scope.resolve(setting).await,
            Target::Context(context) => context.resolve(setting, options).await,
        }
    }

    /// Resolve a field expression such as `tests.TestGenericSetting.title`.
    ///
    /// The field part may itself be dotted to reach into nested objects.
    #[instrument(skip_all, fields(expression = %expression))]
    pub async fn resolve_field<'a>(
        &self,
        expression: &str,
        target: impl Into<Target<'a>>,
        options: ResolveOptions,
    ) -> Result<Value, SettingsError> {
        let path = FieldPath::parse(expression)?;
        let setting = self.lookup_key(path.key())?;
        let instance = self.resolve_type(&setting, target, options).await?;
        instance.lookup(path.field()).cloned()
    }

    /// Lazy accessor over every registered namespace. Nothing is fetched
    /// until a leaf is requested.
    pub fn proxy<'a>(
        &'a self,
        target: impl Into<Target<'a>>,
        options: ResolveOptions,
    ) -> SettingsProxy<'a> {
        SettingsProxy::new(self, target.into(), options)
    }

    /// Render contexts whose caches are still alive.
    pub fn live_contexts(&self) -> usize {
        self.inner.contexts.live()
    }
}

impl std::fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService")
            .field("settings", &self.inner.registry.len())
            .field("live_contexts", &self.live_contexts())
            .finish_non_exhaustive()
    }
}
