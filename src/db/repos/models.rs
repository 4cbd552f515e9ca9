use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{EvictionCandidate, Model, ModelFile, ModelFootprint, ModelWithFiles, NewModelRecord},
};

/// Repository trait for models, their versions, files and tags.
///
/// Every read excludes soft-deleted models.
#[async_trait]
pub trait ModelRepo: Send + Sync {
    /// Insert the model, its first version, its files and tag links, and bump
    /// the tenant's advisory counters, all in one transaction.
    ///
    /// Returns `DbError::Conflict` on a slug or storage key collision.
    async fn create_with_files(&self, record: NewModelRecord) -> DbResult<Model>;

    async fn get(&self, tenant_id: Uuid, model_id: Uuid) -> DbResult<Option<ModelWithFiles>>;

    /// Non-deleted models of a tenant, newest first.
    async fn list_by_tenant(&self, tenant_id: Uuid) -> DbResult<Vec<Model>>;

    /// Look up a file of a non-deleted model of the tenant.
    async fn get_file(&self, tenant_id: Uuid, file_id: Uuid) -> DbResult<Option<ModelFile>>;

    /// Storage keys and total size of a non-deleted model.
    async fn footprint(&self, tenant_id: Uuid, model_id: Uuid)
    -> DbResult<Option<ModelFootprint>>;

    /// Mark the model deleted and decrement the advisory counters by the
    /// footprint. Returns `false` if the model was already deleted or missing.
    async fn soft_delete(
        &self,
        footprint: &ModelFootprint,
        deleted_at: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Non-deleted models of a tenant with their aggregate size, oldest first.
    /// Models created in the same instant keep their insertion order.
    async fn list_eviction_candidates(&self, tenant_id: Uuid) -> DbResult<Vec<EvictionCandidate>>;
}
