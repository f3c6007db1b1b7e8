//! Lazy accessors for template bindings.
//!
//! `proxy.namespace("tests").get("TestSetting")` resolves one type; building
//! either proxy performs no lookup and no store access.

use std::sync::Arc;

use crate::application::error::SettingsError;
use crate::application::instance::SettingInstance;
use crate::application::service::{ResolveOptions, SettingsService, Target};
use crate::domain::keys::NaturalKey;

#[derive(Debug, Clone, Copy)]
pub struct SettingsProxy<'a> {
    service: &'a SettingsService,
    target: Target<'a>,
    options: ResolveOptions,
}

impl<'a> SettingsProxy<'a> {
    pub(crate) fn new(service: &'a SettingsService, target: Target<'a>, options: ResolveOptions) -> Self {
        Self {
            service,
            target,
            options,
        }
    }

    pub fn namespace(&self, name: &str) -> NamespaceProxy<'a> {
        NamespaceProxy {
            service: self.service,
            target: self.target,
            options: self.options,
            namespace: name.to_string(),
        }
    }

    /// Resolve a full dotted key.
    pub async fn get(&self, key: &str) -> Result<Arc<SettingInstance>, SettingsError> {
        self.service.resolve(key, self.target, self.options).await
    }
}

/// Settings types of one namespace.
#[derive(Debug, Clone)]
pub struct NamespaceProxy<'a> {
    service: &'a SettingsService,
    target: Target<'a>,
    options: ResolveOptions,
    namespace: String,
}

impl NamespaceProxy<'_> {
    pub fn name(&self) -> &str {
        &self.namespace
    }

    /// Resolve `type_name` within this namespace, case-insensitively.
    pub async fn get(&self, type_name: &str) -> Result<Arc<SettingInstance>, SettingsError> {
        let key = NaturalKey::new(&self.namespace, type_name);
        let setting = self.service.lookup_key(&key).map_err(|_| {
            SettingsError::unknown_setting(format!("{}.{}", self.namespace, type_name))
        })?;
        self.service
            .resolve_type(&setting, self.target, self.options)
            .await
    }
}
