//! Usage accounting, grace periods and retention enforcement for a
//! multi-tenant 3D model library.
//!
//! - [`services`]: usage accounting, the grace state machine and write guard,
//!   the model lifecycle, object storage, billing and notifications
//! - [`retention`]: oldest-first eviction once a retention window elapses
//! - [`jobs`]: the account deletion sweep
//! - [`db`]: SQLite repositories and migrations

pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod retention;
pub mod services;

#[cfg(test)]
mod tests;
