//! OCI Build Core - Foundational Types
//!
//! This module provides the error taxonomy, configuration values and the
//! image metadata record shared by the runtime and the CLI.

pub mod config;
pub mod error;
pub mod metadata;

// Re-export commonly used types
pub use config::{DaemonConfig, LogLevel, RegistryConfig, TaskConfig, UnpackConfig};
pub use error::{BuildError, Result};
pub use metadata::ImageMetadata;

/// OCI Build version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
