//! Model lifecycle: create and delete models together with their stored files.
//!
//! Objects are written before the relational commit that makes a model
//! visible. If anything fails after the first write, every object written by
//! that call is deleted again and the original error is returned.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::{
    DeleteFilesResult, GraceService, GraceTransition, ObjectStorage, ObjectStorageError,
    UsageService, WriteBlocked, check_write_allowed, with_timeout,
};
use crate::{
    db::{DbError, DbPool},
    models::{
        CreateModel, Model, ModelFootprint, ModelWithFiles, NewModelFile, NewModelRecord, Tenant,
        TenantUsage, TierLimits, slugify,
    },
};

#[derive(Debug, Error)]
pub enum ModelServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Uploads blocked: {0}")]
    WriteBlocked(#[from] WriteBlocked),

    #[error(
        "Quota exceeded: {current_models} models / {current_bytes} bytes plus {incoming_bytes} bytes exceeds the plan limits"
    )]
    QuotaExceeded {
        current_models: i64,
        current_bytes: i64,
        incoming_bytes: i64,
        limits: TierLimits,
    },

    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Model not found: {0}")]
    ModelNotFound(Uuid),

    #[error("File not found: {0}")]
    FileNotFound(Uuid),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] ObjectStorageError),
}

impl From<DbError> for ModelServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Conflict(msg) => ModelServiceError::Conflict(msg),
            other => ModelServiceError::Database(other),
        }
    }
}

pub type ModelServiceResult<T> = Result<T, ModelServiceError>;

/// Result of a user-initiated delete.
pub type DeletedModel = ModelFootprint;

/// Result of evicting one model: its footprint and what storage reported.
#[derive(Debug, Clone)]
pub struct EvictedModel {
    pub footprint: ModelFootprint,
    pub storage: DeleteFilesResult,
}

/// Maximum characters kept from a filename stem in storage keys.
const MAX_KEY_STEM_LENGTH: usize = 64;

const KEY_TOKEN_LENGTH: usize = 8;

/// Build a collision-resistant storage key for an uploaded file.
///
/// `tenants/{tenant}/models/{model}/versions/{version}/{stem}-{token}.{ext}`
pub fn build_storage_key(
    tenant_id: Uuid,
    model_id: Uuid,
    version_id: Uuid,
    filename: &str,
) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_TOKEN_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    let (stem, ext) = sanitize_filename(filename);
    format!(
        "tenants/{}/models/{}/versions/{}/{}-{}.{}",
        tenant_id, model_id, version_id, stem, token, ext
    )
}

/// Split a client filename into a key-safe stem and lowercase extension.
fn sanitize_filename(filename: &str) -> (String, String) {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (base, ""),
    };

    let mut clean = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            clean.push(c);
        } else if !clean.ends_with('-') {
            clean.push('-');
        }
    }
    let clean: String = clean
        .trim_matches('-')
        .chars()
        .take(MAX_KEY_STEM_LENGTH)
        .collect();
    let clean = if clean.is_empty() {
        "file".to_string()
    } else {
        clean.trim_end_matches('-').to_string()
    };

    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(16)
        .collect();
    let ext = if ext.is_empty() { "bin".to_string() } else { ext };

    (clean, ext)
}

fn content_type_for(filename: &str, declared: Option<&str>) -> String {
    if let Some(declared) = declared.filter(|d| !d.trim().is_empty()) {
        return declared.to_string();
    }
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "stl" => "model/stl",
        "3mf" => "model/3mf",
        "obj" => "model/obj",
        "step" | "stp" => "model/step",
        "gcode" => "text/x.gcode",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn content_hash(data: &Bytes) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Clone)]
pub struct ModelService {
    db: Arc<DbPool>,
    storage: Arc<dyn ObjectStorage>,
    usage: UsageService,
    grace: GraceService,
    storage_timeout: Duration,
}

impl ModelService {
    pub fn new(
        db: Arc<DbPool>,
        storage: Arc<dyn ObjectStorage>,
        usage: UsageService,
        grace: GraceService,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            db,
            storage,
            usage,
            grace,
            storage_timeout,
        }
    }

    async fn tenant(&self, tenant_id: Uuid) -> ModelServiceResult<Tenant> {
        self.db
            .tenants()
            .get_by_id(tenant_id)
            .await?
            .ok_or(ModelServiceError::TenantNotFound(tenant_id))
    }

    /// Create a model with its first version and files.
    #[instrument(skip(self, input), fields(name = %input.name, files = input.files.len()))]
    pub async fn create_model(
        &self,
        tenant_id: Uuid,
        owner_id: Uuid,
        input: CreateModel,
    ) -> ModelServiceResult<Model> {
        input
            .validate()
            .map_err(|e| ModelServiceError::Validation(e.to_string()))?;
        if let Some(file) = input.files.iter().find(|f| f.data.is_empty()) {
            return Err(ModelServiceError::Validation(format!(
                "File '{}' is empty",
                file.filename
            )));
        }
        if input.files.iter().any(|f| f.filename.trim().is_empty()) {
            return Err(ModelServiceError::Validation(
                "Filenames cannot be empty".to_string(),
            ));
        }
        let slug = slugify(&input.name).ok_or_else(|| {
            ModelServiceError::Validation(
                "Model name must contain at least one letter or digit".to_string(),
            )
        })?;

        let now = Utc::now().trunc_subsecs(3);
        let tenant = self.tenant(tenant_id).await?;
        check_write_allowed(&tenant, now)?;

        let incoming_bytes: i64 = input.files.iter().map(|f| f.data.len() as i64).sum();
        let usage = self.usage.compute_usage(tenant_id).await?;
        ensure_fits(&usage, &tenant.limits, incoming_bytes)?;

        let model_id = Uuid::new_v4();
        let version_id = Uuid::new_v4();
        let mut written: Vec<String> = Vec::with_capacity(input.files.len());
        let mut files = Vec::with_capacity(input.files.len());

        for upload in input.files {
            let key = build_storage_key(tenant_id, model_id, version_id, &upload.filename);
            let content_type = content_type_for(&upload.filename, upload.content_type.as_deref());
            let hash = content_hash(&upload.data);
            let size_bytes = upload.data.len() as i64;

            let metadata = HashMap::from([
                ("tenant-id".to_string(), tenant_id.to_string()),
                ("model-id".to_string(), model_id.to_string()),
                ("sha256".to_string(), hash.clone()),
            ]);

            // A failed or timed-out put may still have stored the object.
            written.push(key.clone());
            let put = with_timeout(
                self.storage_timeout,
                self.storage.put(&key, upload.data, &content_type, &metadata),
            )
            .await;
            if let Err(e) = put {
                warn!(tenant_id = %tenant_id, model_id = %model_id, key = %key, error = %e, "Upload failed");
                self.compensate(&written).await;
                return Err(e.into());
            }

            files.push(NewModelFile {
                id: Uuid::new_v4(),
                filename: upload.filename,
                size_bytes,
                content_type,
                content_hash: hash,
                storage_key: key,
                storage_bucket: self.storage.bucket().to_string(),
            });
        }

        let record = NewModelRecord {
            id: model_id,
            tenant_id,
            owner_id,
            name: input.name,
            slug,
            tags: input.tags,
            version_id,
            files,
            created_at: now,
        };

        match self.db.models().create_with_files(record).await {
            Ok(model) => {
                info!(
                    tenant_id = %tenant_id,
                    model_id = %model.id,
                    bytes = incoming_bytes,
                    "Model created"
                );
                Ok(model)
            }
            Err(e) => {
                warn!(tenant_id = %tenant_id, model_id = %model_id, error = %e, "Model commit failed");
                self.compensate(&written).await;
                Err(e.into())
            }
        }
    }

    /// Best-effort removal of objects written by a failed create.
    async fn compensate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }

        let to_delete = keys.to_vec();
        match with_timeout(self.storage_timeout, self.storage.delete_files(&to_delete)).await {
            Ok(result) => {
                for failed in &result.failed {
                    warn!(key = %failed.key, error = %failed.error, "Compensating delete failed");
                }
                debug!(deleted = result.deleted.len(), "Compensating delete finished");
            }
            Err(e) => {
                warn!(keys = keys.len(), error = %e, "Compensating delete failed");
            }
        }
    }

    /// Soft-delete a model owned by the tenant.
    ///
    /// Allowed while uploads are blocked so tenants can get back under their
    /// limits. Usage is re-checked afterwards, so a delete that brings the
    /// tenant back within its limits lifts the block at once.
    #[instrument(skip(self))]
    pub async fn delete_model(
        &self,
        tenant_id: Uuid,
        model_id: Uuid,
    ) -> ModelServiceResult<DeletedModel> {
        let footprint = self
            .db
            .models()
            .footprint(tenant_id, model_id)
            .await?
            .ok_or(ModelServiceError::ModelNotFound(model_id))?;

        let deleted = self
            .db
            .models()
            .soft_delete(&footprint, Utc::now().trunc_subsecs(3))
            .await?;
        if !deleted {
            return Err(ModelServiceError::ModelNotFound(model_id));
        }

        info!(
            tenant_id = %tenant_id,
            model_id = %model_id,
            bytes = footprint.size_bytes,
            "Model deleted"
        );

        // The delete already committed; a failed re-check waits for the next scheduled pass.
        match self.grace.check_usage(tenant_id).await {
            Ok(GraceTransition::Cleared) => {
                info!(tenant_id = %tenant_id, "Grace cleared by model delete");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Usage re-check after delete failed");
            }
        }
        Ok(footprint)
    }

    /// Delete every stored object of a model. Per-key failures are reported
    /// in the result.
    pub async fn delete_model_storage(
        &self,
        footprint: &ModelFootprint,
    ) -> ModelServiceResult<DeleteFilesResult> {
        if footprint.storage_keys.is_empty() {
            return Ok(DeleteFilesResult::default());
        }
        let result = with_timeout(
            self.storage_timeout,
            self.storage.delete_files(&footprint.storage_keys),
        )
        .await?;

        for failed in &result.failed {
            warn!(
                tenant_id = %footprint.tenant_id,
                model_id = %footprint.model_id,
                key = %failed.key,
                error = %failed.error,
                "Failed to delete model object"
            );
        }
        Ok(result)
    }

    /// Storage first, then the row. Used by the retention sweep.
    #[instrument(skip(self))]
    pub async fn evict_model(
        &self,
        tenant_id: Uuid,
        model_id: Uuid,
        now: DateTime<Utc>,
    ) -> ModelServiceResult<EvictedModel> {
        let footprint = self
            .db
            .models()
            .footprint(tenant_id, model_id)
            .await?
            .ok_or(ModelServiceError::ModelNotFound(model_id))?;

        let storage = self.delete_model_storage(&footprint).await?;

        if !self
            .db
            .models()
            .soft_delete(&footprint, now.trunc_subsecs(3))
            .await?
        {
            return Err(ModelServiceError::ModelNotFound(model_id));
        }

        Ok(EvictedModel { footprint, storage })
    }

    pub async fn list_models(&self, tenant_id: Uuid) -> ModelServiceResult<Vec<Model>> {
        Ok(self.db.models().list_by_tenant(tenant_id).await?)
    }

    pub async fn get_model(
        &self,
        tenant_id: Uuid,
        model_id: Uuid,
    ) -> ModelServiceResult<ModelWithFiles> {
        self.db
            .models()
            .get(tenant_id, model_id)
            .await?
            .ok_or(ModelServiceError::ModelNotFound(model_id))
    }

    /// Time-limited download link for one file. Never blocked by the write guard.
    pub async fn download_url(
        &self,
        tenant_id: Uuid,
        file_id: Uuid,
        ttl_minutes: u32,
    ) -> ModelServiceResult<String> {
        let file = self
            .db
            .models()
            .get_file(tenant_id, file_id)
            .await?
            .ok_or(ModelServiceError::FileNotFound(file_id))?;

        Ok(with_timeout(
            self.storage_timeout,
            self.storage
                .generate_download_url(&file.storage_key, ttl_minutes),
        )
        .await?)
    }
}

fn ensure_fits(
    usage: &TenantUsage,
    limits: &TierLimits,
    incoming_bytes: i64,
) -> ModelServiceResult<()> {
    if usage.fits_after(limits, 1, incoming_bytes) {
        return Ok(());
    }
    Err(ModelServiceError::QuotaExceeded {
        current_models: usage.model_count,
        current_bytes: usage.storage_bytes,
        incoming_bytes,
        limits: *limits,
    })
}
