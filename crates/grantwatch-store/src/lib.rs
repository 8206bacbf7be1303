//! Grant persistence: the `GrantStore` seam plus Postgres and in-memory
//! implementations.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use grantwatch_core::{Grant, GrantDraft};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "grantwatch-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Message(String),
}

/// Listing filter. `limit`/`offset` paginate; `agency` is a case-insensitive
/// substring match.
#[derive(Debug, Clone, Default)]
pub struct GrantQuery {
    pub agency: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl GrantQuery {
    pub fn page(agency: Option<String>, page: usize, per_page: usize) -> Self {
        let per_page = per_page.clamp(1, 200);
        let offset = page.max(1).saturating_sub(1).saturating_mul(per_page);
        Self {
            agency,
            limit: per_page as i64,
            offset: offset.min(i64::MAX as usize) as i64,
        }
    }
}

/// Storage contract for the sync pipeline and the web read side. Keyed by
/// the feed's own external id; upsert must be idempotent per key.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn upsert(&self, draft: &GrantDraft) -> Result<Grant, StoreError>;
    async fn delete_by_external_id(&self, external_id: &str) -> Result<bool, StoreError>;
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Grant>, StoreError>;
    async fn list(&self, query: &GrantQuery) -> Result<Vec<Grant>, StoreError>;
    async fn count(&self) -> Result<i64, StoreError>;
}

/// sqlx Postgres implementation.
#[derive(Debug, Clone)]
pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Message(format!("migration failed: {err}")))?;
        info!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn grant_from_row(row: &PgRow) -> Result<Grant, sqlx::Error> {
    Ok(Grant {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        agency: row.try_get("agency")?,
        post_date: row.try_get::<Option<NaiveDate>, _>("post_date")?,
        close_date: row.try_get::<Option<NaiveDate>, _>("close_date")?,
        synopsis: row.try_get("synopsis")?,
        eligibility: row.try_get("eligibility")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn upsert(&self, draft: &GrantDraft) -> Result<Grant, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO grants (external_id, title, agency, post_date, close_date, synopsis, eligibility)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (external_id) DO UPDATE SET
                title = EXCLUDED.title,
                agency = EXCLUDED.agency,
                post_date = EXCLUDED.post_date,
                close_date = EXCLUDED.close_date,
                synopsis = EXCLUDED.synopsis,
                eligibility = EXCLUDED.eligibility,
                updated_at = NOW()
            RETURNING id, external_id, title, agency, post_date, close_date,
                      synopsis, eligibility, created_at, updated_at
            "#,
        )
        .bind(&draft.external_id)
        .bind(&draft.title)
        .bind(&draft.agency)
        .bind(draft.post_date)
        .bind(draft.close_date)
        .bind(&draft.synopsis)
        .bind(&draft.eligibility)
        .fetch_one(&self.pool)
        .await?;
        Ok(grant_from_row(&row)?)
    }

    async fn delete_by_external_id(&self, external_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM grants WHERE external_id = $1")
            .bind(external_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Grant>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, external_id, title, agency, post_date, close_date,
                   synopsis, eligibility, created_at, updated_at
              FROM grants
             WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(grant_from_row).transpose()?)
    }

    async fn list(&self, query: &GrantQuery) -> Result<Vec<Grant>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, external_id, title, agency, post_date, close_date,
                   synopsis, eligibility, created_at, updated_at
              FROM grants
             WHERE ($1::text IS NULL OR agency ILIKE '%' || $1 || '%')
             ORDER BY post_date DESC NULLS LAST, external_id
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&query.agency)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| grant_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM grants")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }
}

/// In-memory implementation used by tests and offline runs. Rows keep a
/// stable id and created_at across upserts, matching the Postgres behavior.
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    rows: Mutex<BTreeMap<String, Grant>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn upsert(&self, draft: &GrantDraft) -> Result<Grant, StoreError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        let grant = match rows.get(&draft.external_id) {
            Some(existing) => Grant {
                id: existing.id,
                external_id: draft.external_id.clone(),
                title: draft.title.clone(),
                agency: draft.agency.clone(),
                post_date: draft.post_date,
                close_date: draft.close_date,
                synopsis: draft.synopsis.clone(),
                eligibility: draft.eligibility.clone(),
                created_at: existing.created_at,
                updated_at: now,
            },
            None => Grant {
                id: Uuid::new_v4(),
                external_id: draft.external_id.clone(),
                title: draft.title.clone(),
                agency: draft.agency.clone(),
                post_date: draft.post_date,
                close_date: draft.close_date,
                synopsis: draft.synopsis.clone(),
                eligibility: draft.eligibility.clone(),
                created_at: now,
                updated_at: now,
            },
        };
        rows.insert(draft.external_id.clone(), grant.clone());
        Ok(grant)
    }

    async fn delete_by_external_id(&self, external_id: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().await.remove(external_id).is_some())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Grant>, StoreError> {
        Ok(self.rows.lock().await.get(external_id).cloned())
    }

    async fn list(&self, query: &GrantQuery) -> Result<Vec<Grant>, StoreError> {
        let rows = self.rows.lock().await;
        let needle = query.agency.as_deref().map(str::to_lowercase);
        let mut grants: Vec<Grant> = rows
            .values()
            .filter(|grant| match &needle {
                Some(needle) => grant
                    .agency
                    .as_deref()
                    .map(|agency| agency.to_lowercase().contains(needle))
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect();
        grants.sort_by(|a, b| {
            b.post_date
                .cmp(&a.post_date)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        Ok(grants
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.rows.lock().await.len() as i64)
    }
}
