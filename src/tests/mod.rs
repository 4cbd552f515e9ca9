//! End-to-end engine tests.
//!
//! Every test builds its own [`harness::EngineHarness`]: a migrated in-memory
//! database, filesystem object storage in a temp directory, and recording
//! billing and notification doubles. Faults are injected through the
//! harness storage wrapper.

mod lifecycle_e2e;
mod retention_e2e;
