//! OCI Build Runtime - daemon supervision, local registry and rootfs unpacking.
//!
//! This crate provides the three moving parts of a build task: the build
//! daemon supervisor, the read-only local OCI registry that makes preloaded
//! archives pullable, and the layer materializer that flattens an image
//! into a root filesystem.

pub mod daemon;
pub mod oci;
pub mod registry;

// Re-export common types
pub use daemon::{BuildDaemon, Buildctl, ControlProbe, LaunchMode};
pub use oci::{unpack_rootfs, Digest, ImageArchive, ImageArtifact, UnpackOptions, Unpacker};
pub use registry::{LocalRegistry, RegistryEntry};

/// OCI Build Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
