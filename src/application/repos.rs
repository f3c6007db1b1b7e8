//! Collaborator traits describing persistence and tenant lookup adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::application::registry::SettingType;
use crate::domain::entities::{SettingRecord, SiteRecord};
use crate::domain::sites::RequestInfo;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("store timeout")]
    Timeout,
}

impl StoreError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Get-or-create access to settings records.
///
/// Implementations must not create a second record for the same type and
/// site. Racing first creations across processes are resolved by the
/// backing store's uniqueness constraint, not here.
#[async_trait]
pub trait SettingStore: Send + Sync {
    /// Fetch the record of `setting` for `site`, creating it from the type's
    /// defaults when absent.
    async fn get_or_create_for_site(
        &self,
        setting: &SettingType,
        site: &SiteRecord,
    ) -> Result<SettingRecord, StoreError>;

    /// Fetch the first record of `setting` in store order, creating one from
    /// the type's defaults when none exists.
    async fn get_or_create_singleton(
        &self,
        setting: &SettingType,
    ) -> Result<SettingRecord, StoreError>;
}

/// Tenant lookup for incoming requests.
#[async_trait]
pub trait SiteResolver: Send + Sync {
    async fn find_for_request(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<SiteRecord>, StoreError>;

    async fn default_site(&self) -> Result<Option<SiteRecord>, StoreError>;
}

/// Maps page references stored in settings fields to public URLs.
#[async_trait]
pub trait PageUrlResolver: Send + Sync {
    /// URL of `page_id` as seen from `site_id`, or `None` when the page is gone.
    async fn page_url(
        &self,
        page_id: Uuid,
        site_id: Option<Uuid>,
    ) -> Result<Option<String>, StoreError>;
}
