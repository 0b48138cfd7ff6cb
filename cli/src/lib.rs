//! OCI Build CLI - runs the build daemon, local registry and rootfs unpacker.

pub mod commands;
