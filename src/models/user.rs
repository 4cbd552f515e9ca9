use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A user account. Users own tenants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// Voluntary account deletion deadline.
    pub deletion_scheduled_for: Option<DateTime<Utc>>,
    pub deletion_canceled_at: Option<DateTime<Utc>>,
    pub deletion_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(email, length(max = 320))]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
}

/// A login session; may point at the tenant currently selected in the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub active_tenant_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
