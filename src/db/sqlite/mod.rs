mod common;
mod models;
mod runs;
mod tenants;
mod usage;
mod users;

pub use models::SqliteModelRepo;
pub use runs::SqliteRunRepo;
pub use tenants::SqliteTenantRepo;
pub use usage::SqliteUsageRepo;
pub use users::SqliteUserRepo;
