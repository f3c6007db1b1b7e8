//! Resolved settings instances.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::application::error::SettingsError;
use crate::application::registry::SettingType;
use crate::application::repos::PageUrlResolver;
use crate::cache::MemoMap;
use crate::domain::entities::SettingRecord;
use crate::domain::types::ScopeIdentity;

const PAGE_URL_LAYER: &str = "page_url";
const PAGE_REFERENCE_KEY: &str = "page_id";

/// One settings record resolved for a scope.
///
/// Instances are handed out as `Arc<SettingInstance>`; caches return the same
/// allocation for every lookup of the same key, so identity can be checked
/// with `Arc::ptr_eq`.
pub struct SettingInstance {
    setting: Arc<SettingType>,
    scope: ScopeIdentity,
    record: SettingRecord,
    page_urls: MemoMap<String, String>,
}

impl SettingInstance {
    pub fn new(setting: Arc<SettingType>, scope: ScopeIdentity, record: SettingRecord) -> Self {
        Self {
            setting,
            scope,
            record,
            page_urls: MemoMap::new(PAGE_URL_LAYER),
        }
    }

    pub fn setting(&self) -> &SettingType {
        &self.setting
    }

    pub fn scope(&self) -> ScopeIdentity {
        self.scope
    }

    pub fn record(&self) -> &SettingRecord {
        &self.record
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.data.get(name)
    }

    pub fn get(&self, name: &str) -> Result<&Value, SettingsError> {
        self.field(name)
            .ok_or_else(|| SettingsError::unknown_field(self.setting.key(), name))
    }

    /// Follow a dotted path through nested objects, e.g. `social.twitter`.
    pub fn lookup(&self, path: &str) -> Result<&Value, SettingsError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.get(first)?;
        for segment in segments {
            current = current
                .as_object()
                .and_then(|object| object.get(segment))
                .ok_or_else(|| SettingsError::unknown_field(self.setting.key(), path))?;
        }
        Ok(current)
    }

    /// URL of the page referenced by `field`, memoised per instance.
    ///
    /// A page reference is an object carrying a `page_id` uuid. Null values,
    /// other values, and references to pages the resolver no longer knows all
    /// yield an empty string. Unknown fields are an error.
    pub async fn page_url(
        &self,
        field: &str,
        pages: &dyn PageUrlResolver,
    ) -> Result<String, SettingsError> {
        let page_id = page_reference(self.get(field)?);
        let site_id = self.record.site_id;
        self.page_urls
            .get_or_try_init(field.to_string(), || async move {
                let Some(page_id) = page_id else {
                    return Ok(String::new());
                };
                let url = pages.page_url(page_id, site_id).await?;
                Ok::<_, SettingsError>(url.unwrap_or_default())
            })
            .await
    }
}

impl std::fmt::Debug for SettingInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingInstance")
            .field("setting", self.setting.key())
            .field("scope", &self.scope)
            .field("record", &self.record.id)
            .finish()
    }
}

fn page_reference(value: &Value) -> Option<Uuid> {
    value
        .as_object()?
        .get(PAGE_REFERENCE_KEY)?
        .as_str()
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
