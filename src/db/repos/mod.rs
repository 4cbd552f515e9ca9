mod models;
mod runs;
mod tenants;
mod usage;
mod users;

pub use models::*;
pub use runs::*;
pub use tenants::*;
pub use usage::*;
pub use users::*;
