mod model;
mod run;
mod tenant;
mod usage;
mod user;
mod validators;

pub use model::*;
pub use run::*;
pub use tenant::*;
pub use usage::*;
pub use user::*;
pub use validators::*;
