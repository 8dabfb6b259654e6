//! Asset repository: selection and partial updates on the `assets` table.

use dimsync_core::tags::{BARE_REPROCESS_PATTERN, FAILED_TAG_PATTERN, OVERRIDE_PATTERN};
use dimsync_core::{AssetRecord, AssetUpdate, DimsyncError, SelectionScope};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Query/update contract for the asset record store.
///
/// The worker only ever touches `width`, `height` and `tags` of existing rows.
#[async_trait::async_trait]
pub trait AssetStore: Send + Sync {
    /// Set both dimensions to NULL on every video row where either is 0.
    /// Returns the number of rows changed.
    async fn normalize_zero_dimensions(&self) -> Result<u64, DimsyncError>;

    /// Eligible video rows ordered by id, at most `limit`, starting after the
    /// `after` id when one is given.
    async fn find_candidates(
        &self,
        scope: SelectionScope,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AssetRecord>, DimsyncError>;

    /// Apply a partial update to one row. Errors with `NotFound` if the row is gone.
    async fn update(&self, id: Uuid, update: AssetUpdate) -> Result<(), DimsyncError>;

    async fn get(&self, id: Uuid) -> Result<Option<AssetRecord>, DimsyncError>;

    async fn set_tags(&self, id: Uuid, tags: Option<String>) -> Result<(), DimsyncError> {
        self.update(id, AssetUpdate::tags(tags)).await
    }
}

/// PostgreSQL implementation of [`AssetStore`].
#[derive(Clone)]
pub struct PgAssetRepository {
    pool: PgPool,
}

impl PgAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend_names(scope: SelectionScope) -> Vec<String> {
    scope
        .lookup_backends()
        .iter()
        .map(|b| b.as_str().to_string())
        .collect()
}

#[async_trait::async_trait]
impl AssetStore for PgAssetRepository {
    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "update"))]
    async fn normalize_zero_dimensions(&self) -> Result<u64, DimsyncError> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET width = NULL, height = NULL
            WHERE "type" ILIKE 'video/%' AND (width = 0 OR height = 0)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.operation = "select"))]
    async fn find_candidates(
        &self,
        scope: SelectionScope,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<AssetRecord>, DimsyncError> {
        let rows = sqlx::query_as::<Postgres, AssetRecord>(
            r#"
            SELECT id, "type", storage, filename, width, height, tags
            FROM assets
            WHERE "type" ILIKE 'video/%'
              AND COALESCE(tags, '') !~* $1
              AND (
                    (storage = ANY($2) AND width IS NULL AND height IS NULL)
                 OR COALESCE(tags, '') ~* $3
                 OR (storage = ANY($2) AND COALESCE(tags, '') ~* $4)
              )
              AND ($5::uuid IS NULL OR id > $5)
            ORDER BY id
            LIMIT $6
            "#,
        )
        .bind(FAILED_TAG_PATTERN)
        .bind(backend_names(scope))
        .bind(OVERRIDE_PATTERN)
        .bind(BARE_REPROCESS_PATTERN)
        .bind(after)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "assets", db.operation = "update", db.record_id = %id))]
    async fn update(&self, id: Uuid, update: AssetUpdate) -> Result<(), DimsyncError> {
        if update.is_empty() {
            return Ok(());
        }

        let columns = update.dimensions.map(|d| d.as_columns());
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET width = CASE WHEN $2 THEN $3 ELSE width END,
                height = CASE WHEN $2 THEN $4 ELSE height END,
                tags = CASE WHEN $5 THEN $6 ELSE tags END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(columns.is_some())
        .bind(columns.map(|(w, _)| w))
        .bind(columns.map(|(_, h)| h))
        .bind(update.tags.is_some())
        .bind(update.tags.flatten())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DimsyncError::NotFound(format!("asset {}", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "assets", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<AssetRecord>, DimsyncError> {
        let row = sqlx::query_as::<Postgres, AssetRecord>(
            r#"
            SELECT id, "type", storage, filename, width, height, tags
            FROM assets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
