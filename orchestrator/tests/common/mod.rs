//! Common test utilities and infrastructure
//!
//! Shared fixtures and helpers for the orchestrator integration and unit
//! suites.

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{TestHelpers, Workspace};
