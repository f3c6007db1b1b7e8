use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{SiteResolver, StoreError},
    domain::{
        entities::SiteRecord,
        sites::{RequestInfo, match_site},
    },
};

use super::{PostgresRepositories, map_sqlx_error, util::port_from_db};

#[derive(sqlx::FromRow)]
struct SiteRow {
    id: Uuid,
    hostname: String,
    port: i32,
    site_name: Option<String>,
    is_default_site: bool,
}

impl TryFrom<SiteRow> for SiteRecord {
    type Error = StoreError;

    fn try_from(row: SiteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            hostname: row.hostname,
            port: port_from_db(row.port)?,
            site_name: row.site_name,
            is_default_site: row.is_default_site,
        })
    }
}

impl PostgresRepositories {
    /// Insert or refresh a site keyed by hostname and port, returning the
    /// stored row.
    ///
    /// Flagging a site as the default clears the flag on every other site in
    /// the same transaction, so the default can move between sites.
    pub async fn upsert_site(&self, site: &SiteRecord) -> Result<SiteRecord, StoreError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        if site.is_default_site {
            sqlx::query(
                r#"
                UPDATE sites
                   SET is_default_site = FALSE
                 WHERE is_default_site
                   AND NOT (hostname = lower($1) AND port = $2)
                "#,
            )
            .bind(&site.hostname)
            .bind(i32::from(site.port))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        let row = sqlx::query_as::<_, SiteRow>(
            r#"
            INSERT INTO sites (id, hostname, port, site_name, is_default_site)
            VALUES ($1, lower($2), $3, $4, $5)
            ON CONFLICT (hostname, port) DO UPDATE
               SET site_name = EXCLUDED.site_name,
                   is_default_site = EXCLUDED.is_default_site
            RETURNING id, hostname, port, site_name, is_default_site
            "#,
        )
        .bind(site.id)
        .bind(&site.hostname)
        .bind(i32::from(site.port))
        .bind(site.site_name.as_deref())
        .bind(site.is_default_site)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        row.try_into()
    }
}

#[async_trait]
impl SiteResolver for PostgresRepositories {
    async fn find_for_request(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<SiteRecord>, StoreError> {
        let rows = sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT id, hostname, port, site_name, is_default_site
            FROM sites
            WHERE hostname = $1 OR is_default_site
            ORDER BY hostname, port
            "#,
        )
        .bind(request.hostname())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let candidates = rows
            .into_iter()
            .map(SiteRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match_site(&candidates, request.hostname(), request.port()).cloned())
    }

    async fn default_site(&self) -> Result<Option<SiteRecord>, StoreError> {
        let row = sqlx::query_as::<_, SiteRow>(
            r#"
            SELECT id, hostname, port, site_name, is_default_site
            FROM sites
            WHERE is_default_site
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(SiteRecord::try_from).transpose()
    }
}
