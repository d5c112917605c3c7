// Error utilities for lancom_common

// Use standard error utilities from third-party libraries
pub use anyhow::{anyhow, Context};
pub use thiserror::Error;

/// Crate-wide result alias used by subsystems that don't need a typed error.
pub type Result<T> = anyhow::Result<T>;
