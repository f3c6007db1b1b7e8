use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::{
        registry::SettingType,
        repos::{SettingStore, StoreError},
    },
    domain::entities::{SettingRecord, SiteRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SettingRow {
    id: Uuid,
    namespace: String,
    type_name: String,
    site_id: Option<Uuid>,
    data: Json<Map<String, Value>>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SettingRow> for SettingRecord {
    fn from(row: SettingRow) -> Self {
        Self {
            id: row.id,
            namespace: row.namespace,
            type_name: row.type_name,
            site_id: row.site_id,
            data: row.data.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    async fn find_site_record(
        &self,
        setting: &SettingType,
        site_id: Uuid,
    ) -> Result<Option<SettingRecord>, StoreError> {
        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT id, namespace, type_name, site_id, data, created_at, updated_at
            FROM setting_records
            WHERE lower(namespace) = lower($1)
              AND lower(type_name) = lower($2)
              AND site_id = $3
            "#,
        )
        .bind(setting.namespace())
        .bind(setting.type_name())
        .bind(site_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl SettingStore for PostgresRepositories {
    async fn get_or_create_for_site(
        &self,
        setting: &SettingType,
        site: &SiteRecord,
    ) -> Result<SettingRecord, StoreError> {
        if let Some(record) = self.find_site_record(setting, site.id).await? {
            return Ok(record);
        }

        // A concurrent creator may win; the unique index turns our insert
        // into a no-op and the re-read returns their row.
        sqlx::query(
            r#"
            INSERT INTO setting_records (id, namespace, type_name, site_id, data)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(setting.namespace())
        .bind(setting.type_name())
        .bind(site.id)
        .bind(Json(setting.defaults()))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.find_site_record(setting, site.id)
            .await?
            .ok_or_else(|| StoreError::from_persistence("settings record vanished after insert"))
    }

    async fn get_or_create_singleton(
        &self,
        setting: &SettingType,
    ) -> Result<SettingRecord, StoreError> {
        let existing = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT id, namespace, type_name, site_id, data, created_at, updated_at
            FROM setting_records
            WHERE lower(namespace) = lower($1)
              AND lower(type_name) = lower($2)
              AND site_id IS NULL
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(setting.namespace())
        .bind(setting.type_name())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if let Some(row) = existing {
            return Ok(row.into());
        }

        let row = sqlx::query_as::<_, SettingRow>(
            r#"
            INSERT INTO setting_records (id, namespace, type_name, site_id, data)
            VALUES ($1, $2, $3, NULL, $4)
            RETURNING id, namespace, type_name, site_id, data, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(setting.namespace())
        .bind(setting.type_name())
        .bind(Json(setting.defaults()))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
