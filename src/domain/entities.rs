//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::keys::NaturalKey;

/// A tenant of the deployment, matched against incoming requests by host and port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    pub id: Uuid,
    pub hostname: String,
    pub port: u16,
    pub site_name: Option<String>,
    pub is_default_site: bool,
}

impl SiteRecord {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            hostname: hostname.into().to_ascii_lowercase(),
            port,
            site_name: None,
            is_default_site: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.site_name = Some(name.into());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default_site = true;
        self
    }
}

/// One stored settings record.
///
/// `site_id` is set for site-scoped types and `None` for global and generic
/// types. Field values live in `data`, keyed by field name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingRecord {
    pub id: Uuid,
    pub namespace: String,
    pub type_name: String,
    pub site_id: Option<Uuid>,
    pub data: Map<String, Value>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SettingRecord {
    /// Build a fresh record with the given field values.
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        site_id: Option<Uuid>,
        data: Map<String, Value>,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            type_name: type_name.into(),
            site_id,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.namespace, &self.type_name)
    }

    pub fn belongs_to(&self, key: &NaturalKey) -> bool {
        key.matches(&self.namespace, &self.type_name)
    }
}
