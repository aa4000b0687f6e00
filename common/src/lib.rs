pub mod config;
pub mod yaml_include;

/// Common utilities shared across the campus delivery workspace
///
/// This crate provides shared functionality used by the `delivery` core
/// library and the `campus` application crate:
///
/// - Configuration model and YAML loading (with `!include` support)
/// - Shared test utilities and request builders
/// - Unique identifier helpers for parallel tests

// Test helpers module - available for both development and test builds
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

// Re-export commonly used test utilities for easier access
#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::{
    generate_unique_id, get_test_database_url, get_test_in_memory_database_url,
};
