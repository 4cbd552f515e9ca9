use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateUser, Session, User},
};

/// Repository trait for users and their sessions
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create(&self, input: CreateUser) -> DbResult<User>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<User>>;

    /// Set the deletion deadline and clear any earlier cancellation.
    async fn schedule_deletion(&self, id: Uuid, deadline: DateTime<Utc>) -> DbResult<User>;

    /// Record a cancellation. Returns `DbError::NotFound` if nothing was pending.
    async fn cancel_deletion(&self, id: Uuid, canceled_at: DateTime<Utc>) -> DbResult<User>;

    /// Users whose deadline passed and which are neither canceled nor completed.
    async fn count_due_for_deletion(&self, now: DateTime<Utc>) -> DbResult<i64>;

    async fn list_due_for_deletion(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<User>>;

    /// Remove the user row and its sessions. Tenants must already be gone.
    async fn hard_delete(&self, id: Uuid) -> DbResult<()>;

    async fn create_session(&self, user_id: Uuid, active_tenant_id: Option<Uuid>)
    -> DbResult<Session>;

    async fn get_session(&self, id: Uuid) -> DbResult<Option<Session>>;
}
