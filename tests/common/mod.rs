//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Engine and remote store fixtures
//! - Assertion macros and cache-versus-remote checks

pub mod assertions;
pub mod fixtures;

// Re-export commonly used utilities
pub use assertions::*;
pub use fixtures::*;
