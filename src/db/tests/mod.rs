//! Shared database repository test infrastructure
//!
//! Each repository has a test module containing shared test functions that
//! take a `&DbPool`, plus a `sqlite_test!` wrapper that runs them against a
//! fresh in-memory database.
//!
//! ```bash
//! cargo test db::tests
//! ```

mod runs;
mod tenants;
mod usage;
