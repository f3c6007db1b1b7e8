//! Registry of settings types, keyed by case-insensitive natural key.
//!
//! The registry is built during startup and then frozen behind an `Arc`;
//! there is no removal operation. Lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::application::error::SettingsError;
use crate::domain::keys::NaturalKey;
use crate::domain::types::ScopeKind;

/// Descriptor of a registered settings type.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingType {
    key: NaturalKey,
    namespace: String,
    type_name: String,
    scope: ScopeKind,
    verbose_name: Option<String>,
    defaults: Map<String, Value>,
}

impl SettingType {
    pub fn new(namespace: impl Into<String>, type_name: impl Into<String>, scope: ScopeKind) -> Self {
        let namespace = namespace.into();
        let type_name = type_name.into();
        Self {
            key: NaturalKey::new(&namespace, &type_name),
            namespace,
            type_name,
            scope,
            verbose_name: None,
            defaults: Map::new(),
        }
    }

    pub fn with_verbose_name(mut self, name: impl Into<String>) -> Self {
        self.verbose_name = Some(name.into());
        self
    }

    /// Field values used when the store has to create a record.
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn key(&self) -> &NaturalKey {
        &self.key
    }

    /// Namespace as registered, original casing.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Type name as registered, original casing.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Human label: the verbose name when set, the type name otherwise.
    pub fn label(&self) -> &str {
        self.verbose_name.as_deref().unwrap_or(&self.type_name)
    }
}

/// Append-only map from natural key to settings type.
#[derive(Debug, Default)]
pub struct SettingRegistry {
    types: Vec<Arc<SettingType>>,
    by_key: HashMap<NaturalKey, usize>,
}

impl SettingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions, failing on the first duplicate.
    pub fn from_definitions<I>(definitions: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = SettingType>,
    {
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Register a type. Keys differing only by case collide.
    pub fn register(&mut self, setting: SettingType) -> Result<Arc<SettingType>, SettingsError> {
        if self.by_key.contains_key(setting.key()) {
            return Err(SettingsError::DuplicateRegistration {
                key: setting.key().clone(),
            });
        }
        let setting = Arc::new(setting);
        self.by_key.insert(setting.key().clone(), self.types.len());
        self.types.push(Arc::clone(&setting));
        Ok(setting)
    }

    /// Case-insensitive lookup on both segments.
    pub fn lookup(&self, namespace: &str, type_name: &str) -> Option<Arc<SettingType>> {
        self.get(&NaturalKey::new(namespace, type_name))
    }

    pub fn get(&self, key: &NaturalKey) -> Option<Arc<SettingType>> {
        self.by_key
            .get(key)
            .and_then(|index| self.types.get(*index))
            .cloned()
    }

    pub fn contains(&self, namespace: &str, type_name: &str) -> bool {
        self.by_key
            .contains_key(&NaturalKey::new(namespace, type_name))
    }

    /// Registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SettingType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
