use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ModelRepo,
    },
    models::{
        EvictionCandidate, Model, ModelFile, ModelFootprint, ModelVersion, ModelWithFiles,
        NewModelRecord,
    },
};

pub struct SqliteModelRepo {
    pool: SqlitePool,
}

impl SqliteModelRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_model(row: &SqliteRow, tags: Vec<String>) -> DbResult<Model> {
        Ok(Model {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            tenant_id: parse_uuid(&row.get::<String, _>("tenant_id"))?,
            owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
            name: row.get("name"),
            slug: row.get("slug"),
            tags,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        })
    }

    fn parse_file(row: &SqliteRow) -> DbResult<ModelFile> {
        Ok(ModelFile {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            version_id: parse_uuid(&row.get::<String, _>("version_id"))?,
            filename: row.get("filename"),
            size_bytes: row.get("size_bytes"),
            content_type: row.get("content_type"),
            content_hash: row.get("content_hash"),
            storage_key: row.get("storage_key"),
            storage_bucket: row.get("storage_bucket"),
            created_at: row.get("created_at"),
        })
    }

    /// Tag names per model for every non-deleted model of a tenant.
    async fn tags_by_model(&self, tenant_id: Uuid) -> DbResult<HashMap<Uuid, Vec<String>>> {
        let rows = sqlx::query(
            r#"
            SELECT mt.model_id, t.name
            FROM model_tags mt
            JOIN tags t ON t.id = mt.tag_id
            JOIN models m ON m.id = mt.model_id
            WHERE m.tenant_id = ? AND m.deleted_at IS NULL
            ORDER BY t.name ASC
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
        for row in rows {
            let model_id = parse_uuid(&row.get::<String, _>("model_id"))?;
            tags.entry(model_id).or_default().push(row.get("name"));
        }
        Ok(tags)
    }
}

fn map_conflict(e: sqlx::Error, what: impl FnOnce() -> String) -> DbError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(what()),
        _ => DbError::from(e),
    }
}

#[async_trait]
impl ModelRepo for SqliteModelRepo {
    async fn create_with_files(&self, record: NewModelRecord) -> DbResult<Model> {
        let now = record.created_at;
        let model_id = record.id.to_string();
        let tenant_id = record.tenant_id.to_string();
        let version_id = record.version_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO models (id, tenant_id, owner_id, name, slug, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&model_id)
        .bind(&tenant_id)
        .bind(record.owner_id.to_string())
        .bind(&record.name)
        .bind(&record.slug)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_conflict(e, || {
                format!("Model with slug '{}' already exists in this tenant", record.slug)
            })
        })?;

        sqlx::query(
            r#"
            INSERT INTO model_versions (id, model_id, version_number, created_at)
            VALUES (?, ?, 1, ?)
            "#,
        )
        .bind(&version_id)
        .bind(&model_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for file in &record.files {
            sqlx::query(
                r#"
                INSERT INTO model_files (
                    id, version_id, filename, size_bytes, content_type, content_hash,
                    storage_key, storage_bucket, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.id.to_string())
            .bind(&version_id)
            .bind(&file.filename)
            .bind(file.size_bytes)
            .bind(&file.content_type)
            .bind(&file.content_hash)
            .bind(&file.storage_key)
            .bind(&file.storage_bucket)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                map_conflict(e, || {
                    format!("Storage key '{}' is already in use", file.storage_key)
                })
            })?;
        }

        for tag in &record.tags {
            sqlx::query(
                r#"
                INSERT INTO tags (id, tenant_id, name, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (tenant_id, name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&tenant_id)
            .bind(tag)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT OR IGNORE INTO model_tags (model_id, tag_id)
                SELECT ?, id FROM tags WHERE tenant_id = ? AND name = ?
                "#,
            )
            .bind(&model_id)
            .bind(&tenant_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE tenants
            SET cached_model_count = cached_model_count + 1,
                cached_storage_bytes = cached_storage_bytes + ?
            WHERE id = ?
            "#,
        )
        .bind(record.total_size_bytes())
        .bind(&tenant_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit().await?;

        Ok(Model {
            id: record.id,
            tenant_id: record.tenant_id,
            owner_id: record.owner_id,
            name: record.name,
            slug: record.slug,
            tags: record.tags,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn get(&self, tenant_id: Uuid, model_id: Uuid) -> DbResult<Option<ModelWithFiles>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, tenant_id, owner_id, name, slug, created_at, updated_at, deleted_at
            FROM models
            WHERE id = ? AND tenant_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(model_id.to_string())
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let tags: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.name FROM model_tags mt
            JOIN tags t ON t.id = mt.tag_id
            WHERE mt.model_id = ?
            ORDER BY t.name ASC
            "#,
        )
        .bind(model_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let model = Self::parse_model(&row, tags)?;

        let versions = sqlx::query(
            r#"
            SELECT id, model_id, version_number, created_at
            FROM model_versions
            WHERE model_id = ?
            ORDER BY version_number ASC
            "#,
        )
        .bind(model_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(ModelVersion {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                model_id: parse_uuid(&row.get::<String, _>("model_id"))?,
                version_number: row.get("version_number"),
                created_at: row.get("created_at"),
            })
        })
        .collect::<DbResult<Vec<_>>>()?;

        let files = sqlx::query(
            r#"
            SELECT f.id, f.version_id, f.filename, f.size_bytes, f.content_type,
                   f.content_hash, f.storage_key, f.storage_bucket, f.created_at
            FROM model_files f
            JOIN model_versions v ON v.id = f.version_id
            WHERE v.model_id = ?
            ORDER BY v.version_number ASC, f.filename ASC
            "#,
        )
        .bind(model_id.to_string())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(Self::parse_file)
        .collect::<DbResult<Vec<_>>>()?;

        Ok(Some(ModelWithFiles {
            model,
            versions,
            files,
        }))
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> DbResult<Vec<Model>> {
        let mut tags = self.tags_by_model(tenant_id).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, owner_id, name, slug, created_at, updated_at, deleted_at
            FROM models
            WHERE tenant_id = ? AND deleted_at IS NULL
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id = parse_uuid(&row.get::<String, _>("id"))?;
                Self::parse_model(row, tags.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn get_file(&self, tenant_id: Uuid, file_id: Uuid) -> DbResult<Option<ModelFile>> {
        let row = sqlx::query(
            r#"
            SELECT f.id, f.version_id, f.filename, f.size_bytes, f.content_type,
                   f.content_hash, f.storage_key, f.storage_bucket, f.created_at
            FROM model_files f
            JOIN model_versions v ON v.id = f.version_id
            JOIN models m ON m.id = v.model_id
            WHERE f.id = ? AND m.tenant_id = ? AND m.deleted_at IS NULL
            "#,
        )
        .bind(file_id.to_string())
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_file).transpose()
    }

    async fn footprint(
        &self,
        tenant_id: Uuid,
        model_id: Uuid,
    ) -> DbResult<Option<ModelFootprint>> {
        let exists = sqlx::query(
            "SELECT id FROM models WHERE id = ? AND tenant_id = ? AND deleted_at IS NULL",
        )
        .bind(model_id.to_string())
        .bind(tenant_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query(
            r#"
            SELECT f.storage_key, f.size_bytes
            FROM model_files f
            JOIN model_versions v ON v.id = f.version_id
            WHERE v.model_id = ?
            ORDER BY f.storage_key ASC
            "#,
        )
        .bind(model_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut footprint = ModelFootprint {
            model_id,
            tenant_id,
            size_bytes: 0,
            storage_keys: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            footprint.size_bytes += row.get::<i64, _>("size_bytes");
            footprint.storage_keys.push(row.get("storage_key"));
        }

        Ok(Some(footprint))
    }

    async fn soft_delete(
        &self,
        footprint: &ModelFootprint,
        deleted_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE models
            SET deleted_at = ?, updated_at = ?
            WHERE id = ? AND tenant_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(deleted_at)
        .bind(deleted_at)
        .bind(footprint.model_id.to_string())
        .bind(footprint.tenant_id.to_string())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        // Advisory counters only; clamp so drift never goes negative.
        sqlx::query(
            r#"
            UPDATE tenants
            SET cached_model_count = MAX(cached_model_count - 1, 0),
                cached_storage_bytes = MAX(cached_storage_bytes - ?, 0)
            WHERE id = ?
            "#,
        )
        .bind(footprint.size_bytes)
        .bind(footprint.tenant_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_eviction_candidates(&self, tenant_id: Uuid) -> DbResult<Vec<EvictionCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.name, m.created_at, COALESCE(SUM(f.size_bytes), 0) AS size_bytes
            FROM models m
            LEFT JOIN model_versions v ON v.model_id = m.id
            LEFT JOIN model_files f ON f.version_id = v.id
            WHERE m.tenant_id = ? AND m.deleted_at IS NULL
            GROUP BY m.rowid, m.id, m.name, m.created_at
            ORDER BY m.created_at ASC, m.rowid ASC
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EvictionCandidate {
                    model_id: parse_uuid(&row.get::<String, _>("id"))?,
                    name: row.get("name"),
                    created_at: row.get("created_at"),
                    size_bytes: row.get("size_bytes"),
                })
            })
            .collect()
    }
}
