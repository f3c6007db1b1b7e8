//! In-process adapters used by the CLI when no database is configured and by
//! tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::application::registry::SettingType;
use crate::application::repos::{PageUrlResolver, SettingStore, SiteResolver, StoreError};
use crate::cache::{rw_read, rw_write};
use crate::domain::entities::{SettingRecord, SiteRecord};
use crate::domain::sites::{self, RequestInfo};

const SOURCE: &str = "infra::memory";
const SITE_CONSTRAINT: &str = "setting_records_site_unique";

/// Call counters of an [`InMemorySettingStore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub site_lookups: usize,
    pub singleton_lookups: usize,
    pub created: usize,
}

#[derive(Debug, Default)]
struct Counters {
    site_lookups: AtomicUsize,
    singleton_lookups: AtomicUsize,
    created: AtomicUsize,
}

/// Insertion-ordered settings store.
///
/// At most one row exists per (type, site). The singleton of a type is its
/// first inserted row without a site.
#[derive(Debug, Default)]
pub struct InMemorySettingStore {
    records: RwLock<Vec<SettingRecord>>,
    counters: Counters,
}

impl InMemorySettingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, rejecting duplicate site rows.
    pub fn with_records(
        records: impl IntoIterator<Item = SettingRecord>,
    ) -> Result<Self, StoreError> {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    pub fn insert(&self, record: SettingRecord) -> Result<(), StoreError> {
        let mut records = rw_write(&self.records, SOURCE, "insert");
        if record.site_id.is_some() && records.iter().any(|existing| same_site_row(existing, &record)) {
            return Err(StoreError::Duplicate {
                constraint: SITE_CONSTRAINT.to_string(),
            });
        }
        records.push(record);
        Ok(())
    }

    /// Snapshot of every stored row in insertion order.
    pub fn records(&self) -> Vec<SettingRecord> {
        rw_read(&self.records, SOURCE, "records").clone()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.records, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            site_lookups: self.counters.site_lookups.load(Ordering::Relaxed),
            singleton_lookups: self.counters.singleton_lookups.load(Ordering::Relaxed),
            created: self.counters.created.load(Ordering::Relaxed),
        }
    }

    fn find(&self, setting: &SettingType, site_id: Option<Uuid>) -> Option<SettingRecord> {
        rw_read(&self.records, SOURCE, "find")
            .iter()
            .find(|record| record.belongs_to(setting.key()) && record.site_id == site_id)
            .cloned()
    }

    fn find_or_insert(&self, setting: &SettingType, site_id: Option<Uuid>) -> SettingRecord {
        let mut records = rw_write(&self.records, SOURCE, "find_or_insert");
        if let Some(existing) = records
            .iter()
            .find(|record| record.belongs_to(setting.key()) && record.site_id == site_id)
        {
            return existing.clone();
        }

        let record = SettingRecord::new(
            setting.namespace(),
            setting.type_name(),
            site_id,
            setting.defaults().clone(),
        );
        records.push(record.clone());
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        debug!(
            setting = %setting.key(),
            site = ?site_id,
            record = %record.id,
            "created settings record"
        );
        record
    }
}

fn same_site_row(left: &SettingRecord, right: &SettingRecord) -> bool {
    left.site_id == right.site_id && left.belongs_to(&right.natural_key())
}

#[async_trait]
impl SettingStore for InMemorySettingStore {
    async fn get_or_create_for_site(
        &self,
        setting: &SettingType,
        site: &SiteRecord,
    ) -> Result<SettingRecord, StoreError> {
        self.counters.site_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .find(setting, Some(site.id))
            .unwrap_or_else(|| self.find_or_insert(setting, Some(site.id))))
    }

    async fn get_or_create_singleton(
        &self,
        setting: &SettingType,
    ) -> Result<SettingRecord, StoreError> {
        self.counters.singleton_lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .find(setting, None)
            .unwrap_or_else(|| self.find_or_insert(setting, None)))
    }
}

/// Site resolver over a fixed list of sites.
#[derive(Debug, Default)]
pub struct StaticSiteResolver {
    sites: Vec<SiteRecord>,
    lookups: AtomicUsize,
}

impl StaticSiteResolver {
    pub fn new(sites: Vec<SiteRecord>) -> Self {
        Self {
            sites,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn sites(&self) -> &[SiteRecord] {
        &self.sites
    }

    /// Number of request lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SiteResolver for StaticSiteResolver {
    async fn find_for_request(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<SiteRecord>, StoreError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(sites::match_site(&self.sites, request.hostname(), request.port()).cloned())
    }

    async fn default_site(&self) -> Result<Option<SiteRecord>, StoreError> {
        Ok(sites::default_site(&self.sites).cloned())
    }
}

/// Page URL table keyed by page id.
#[derive(Debug, Default)]
pub struct StaticPageUrls {
    urls: HashMap<Uuid, String>,
}

impl StaticPageUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page_id: Uuid, url: impl Into<String>) -> Self {
        self.urls.insert(page_id, url.into());
        self
    }
}

#[async_trait]
impl PageUrlResolver for StaticPageUrls {
    async fn page_url(
        &self,
        page_id: Uuid,
        _site_id: Option<Uuid>,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.urls.get(&page_id).cloned())
    }
}
