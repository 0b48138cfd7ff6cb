//! `oci-build daemon` command.

use std::path::PathBuf;
use std::process::ExitStatus;

use clap::Args;
use oci_build_core::TaskConfig;
use oci_build_runtime::{BuildDaemon, LocalRegistry};

/// Environment variable the build client reads its daemon address from.
const BUILDKIT_HOST: &str = "BUILDKIT_HOST";

/// Newline-separated `NAME=localhost:PORT/NAME` pairs for preloaded images.
const BUILD_ARGS: &str = "BUILD_ARGS";

#[derive(Args)]
pub struct DaemonArgs {
    /// Daemon root directory (default: $TMPDIR/buildkitd)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Preload an image archive into the local registry (NAME=PATH, repeatable)
    #[arg(long = "image", value_name = "NAME=PATH", value_parser = super::parse_image)]
    pub images: Vec<(String, PathBuf)>,

    /// Command to run once the daemon is ready, with BUILDKIT_HOST and BUILD_ARGS
    /// set; without one, wait for Ctrl-C
    #[arg(last = true)]
    pub command: Vec<String>,
}

pub async fn execute(
    args: DaemonArgs,
    mut config: TaskConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(root) = args.root {
        config.daemon.root_dir = Some(root);
    }
    config.daemon.debug |= config.debug;
    config.registry.images.extend(args.images);

    // Load archives before starting the daemon so bad paths fail fast.
    let registry = if config.registry.images.is_empty() {
        None
    } else {
        Some(LocalRegistry::from_config(&config.registry)?)
    };

    // Stays on the main thread: the daemon's parent-death signal fires when
    // the spawning thread exits, and blocking-pool threads are reaped.
    let mut daemon = BuildDaemon::spawn(&config.daemon)?;
    println!("{}={}", BUILDKIT_HOST, daemon.addr());

    let outcome = run(&daemon, registry, args.command).await;
    settle(outcome, daemon.cleanup())
}

/// The command's outcome wins; a cleanup failure after it is only logged.
fn settle(
    outcome: Result<(), Box<dyn std::error::Error>>,
    cleanup: oci_build_core::Result<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    match (outcome, cleanup) {
        (Err(e), Err(cleanup_err)) => {
            tracing::warn!(error = %cleanup_err, "Build daemon cleanup failed");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), cleanup) => Ok(cleanup?),
    }
}

async fn run(
    daemon: &BuildDaemon,
    registry: Option<LocalRegistry>,
    command: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut build_args = Vec::new();
    if let Some(registry) = registry {
        let port = registry.serve().await?;
        build_args = registry.build_args(port);
        super::print_build_args(&build_args);
    }

    let Some((program, rest)) = command.split_first() else {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Interrupted, stopping build daemon");
        return Ok(());
    };

    tracing::debug!(command = ?command, "Running command against build daemon");
    let mut child = tokio::process::Command::new(program);
    child.args(rest).env(BUILDKIT_HOST, daemon.addr());
    if !build_args.is_empty() {
        child.env(BUILD_ARGS, build_args.join("\n"));
    }
    let status = child
        .status()
        .await
        .map_err(|e| format!("failed to run {}: {}", program, e))?;
    check_status(program, status)
}

fn check_status(program: &str, status: ExitStatus) -> Result<(), Box<dyn std::error::Error>> {
    if status.success() {
        Ok(())
    } else {
        Err(format!("{} failed: {}", program, status).into())
    }
}
