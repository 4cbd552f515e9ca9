use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validators::{validate_files, validate_tags};

/// A printable model: a named bundle of files owned by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    pub tags: Vec<String>,
    /// Eviction ordering key (oldest first).
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Soft-deleted models are invisible to usage and listings.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A version of a model carrying one or more files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: Uuid,
    pub model_id: Uuid,
    pub version_number: i32,
    pub created_at: DateTime<Utc>,
}

/// A single stored file of a model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub id: Uuid,
    pub version_id: Uuid,
    pub filename: String,
    pub size_bytes: i64,
    pub content_type: String,
    /// Hex-encoded SHA-256 of the file content.
    pub content_hash: String,
    /// Unique object-storage key.
    pub storage_key: String,
    /// Bucket (or filesystem store name) holding the object.
    pub storage_bucket: String,
    pub created_at: DateTime<Utc>,
}

/// A model together with its versions and their files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelWithFiles {
    pub model: Model,
    pub versions: Vec<ModelVersion>,
    pub files: Vec<ModelFile>,
}

impl ModelWithFiles {
    pub fn total_size_bytes(&self) -> i64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// An uploaded file as received from the caller.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Input for creating a model through the lifecycle manager.
#[derive(Debug, Clone, Validate)]
pub struct CreateModel {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(custom(function = "validate_tags"))]
    pub tags: Vec<String>,
    #[validate(custom(function = "validate_files"))]
    pub files: Vec<UploadFile>,
}

/// A file row ready to be inserted; its object is already in storage.
#[derive(Debug, Clone)]
pub struct NewModelFile {
    pub id: Uuid,
    pub filename: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub content_hash: String,
    pub storage_key: String,
    pub storage_bucket: String,
}

/// Everything committed in the single create transaction.
#[derive(Debug, Clone)]
pub struct NewModelRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    pub tags: Vec<String>,
    pub version_id: Uuid,
    pub files: Vec<NewModelFile>,
    pub created_at: DateTime<Utc>,
}

impl NewModelRecord {
    pub fn total_size_bytes(&self) -> i64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Storage footprint of one model: what deleting it frees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFootprint {
    pub model_id: Uuid,
    pub tenant_id: Uuid,
    pub size_bytes: i64,
    pub storage_keys: Vec<String>,
}

/// A non-deleted model as seen by the eviction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub model_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: i64,
}
