//! Anomaly Results Integration Tests
//!
//! End-to-end behaviour of the results persister against both store
//! backends. Tests are organized by the job lifecycle they exercise.

pub mod common;
pub mod test_bucket_persistence;
pub mod test_commit_discipline;
pub mod test_filestore_end_to_end;
pub mod test_renormalization;

// Re-export common utilities
pub use common::*;
