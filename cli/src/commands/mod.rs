//! CLI command definitions and dispatch.

mod daemon;
mod registry;
mod unpack;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use oci_build_core::TaskConfig;

/// OCI Build - build daemon, local registry and rootfs tooling for build tasks.
#[derive(Parser)]
#[command(name = "oci-build", version, about)]
pub struct Cli {
    /// Task configuration file (YAML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging; also starts the daemon with --debug and hides progress bars
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Read `--config` (or defaults) and fold in the global flags.
    pub fn load_config(&self) -> oci_build_core::Result<TaskConfig> {
        let mut config = match &self.config {
            Some(path) => TaskConfig::from_file(path)?,
            None => TaskConfig::default(),
        };
        if self.debug {
            config.debug = true;
        }
        Ok(config)
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Start the build daemon and wait until it accepts requests
    Daemon(daemon::DaemonArgs),
    /// Serve image archives over the registry HTTP API
    Registry(registry::RegistryArgs),
    /// Unpack an OCI image archive into a root filesystem
    Unpack(unpack::UnpackArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed command to its handler.
pub async fn dispatch(
    command: Command,
    config: TaskConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Daemon(args) => daemon::execute(args, config).await,
        Command::Registry(args) => registry::execute(args, config).await,
        Command::Unpack(args) => unpack::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}

/// Parse a `NAME=PATH` image argument.
fn parse_image(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", s)),
    }
}

/// Print registry build args, one per line.
fn print_build_args(args: &[String]) {
    for arg in args {
        println!("BUILD_ARG {}", arg);
    }
}
