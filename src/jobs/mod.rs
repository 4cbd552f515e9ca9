//! Batch jobs invoked by an external scheduler or the worker loop.
//!
//! - **Account Deletion Sweep**: erases users whose voluntary deletion
//!   deadline has passed, together with every tenant they own.
//!
//! The retention sweep lives in [`crate::retention`].
//!
//! Jobs follow a consistent pattern:
//! 1. Configuration in its own `[section]` of the config file
//! 2. A run function that performs a single audited pass
//! 3. Structured result type recorded as a run plus per-item rows
//! 4. Metrics for monitoring operations
//!
//! # Example
//!
//! ```toml
//! [account_deletion]
//! batch_size = 500
//! max_due_accounts = 200
//! ```

mod account_deletion;

pub use account_deletion::{
    AccountDeletionError, AccountDeletionResult, SweepOverrides, cancel_account_deletion,
    run_account_deletion_sweep, run_account_deletion_sweep_at, schedule_account_deletion,
};
