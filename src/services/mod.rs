mod billing;
mod grace;
mod models;
mod notifications;
mod object_storage;
mod usage;

use std::{sync::Arc, time::Duration};

pub use billing::{
    BillingError, BillingProvider, BillingResult, DisabledBillingProvider, HttpBillingProvider,
    create_billing_provider,
};
pub use grace::{
    GraceError, GraceResult, GraceService, GraceState, GraceTransition, UsageCheckSummary,
    WriteBlocked, check_write_allowed,
};
pub use models::{
    DeletedModel, EvictedModel, ModelService, ModelServiceError, ModelServiceResult,
    build_storage_key,
};
pub use notifications::{
    LogNotifier, Notifier, NotifyError, NotifyResult, WebhookNotifier, create_notifier,
};
#[cfg(feature = "s3-storage")]
pub use object_storage::S3ObjectStorage;
pub use object_storage::{
    DeleteFilesResult, FailedDelete, FilesystemObjectStorage, ListFilesPage, ObjectStorage,
    ObjectStorageError, ObjectStorageResult, StoredObject, create_object_storage, with_timeout,
};
pub use usage::UsageService;

use crate::{config::PrintshelfConfig, db::DbPool};

/// Errors building the service container from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServicesInitError {
    #[error(transparent)]
    Storage(#[from] ObjectStorageError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error(transparent)]
    Notifications(#[from] NotifyError),
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub db: Arc<DbPool>,
    pub storage: Arc<dyn ObjectStorage>,
    pub billing: Arc<dyn BillingProvider>,
    pub notifier: Arc<dyn Notifier>,
    /// Deadline for each object storage call.
    pub storage_timeout: Duration,
    pub usage: UsageService,
    pub grace: GraceService,
    pub models: ModelService,
}

impl Services {
    pub fn new(
        db: Arc<DbPool>,
        storage: Arc<dyn ObjectStorage>,
        billing: Arc<dyn BillingProvider>,
        notifier: Arc<dyn Notifier>,
        config: &PrintshelfConfig,
    ) -> Self {
        let usage = UsageService::new(db.clone());
        let grace = GraceService::new(
            db.clone(),
            usage.clone(),
            config.retention.clone(),
            config.tiers.clone(),
        );
        Self {
            models: ModelService::new(
                db.clone(),
                storage.clone(),
                usage.clone(),
                grace.clone(),
                config.storage.request_timeout(),
            ),
            grace,
            storage_timeout: config.storage.request_timeout(),
            usage,
            db,
            storage,
            billing,
            notifier,
        }
    }

    /// Build every collaborator from configuration.
    pub async fn from_config(
        db: Arc<DbPool>,
        config: &PrintshelfConfig,
    ) -> Result<Self, ServicesInitError> {
        let storage = create_object_storage(&config.storage).await?;
        let billing = create_billing_provider(&config.billing)?;
        let notifier = create_notifier(&config.notifications)?;
        Ok(Self::new(db, storage, billing, notifier, config))
    }
}
