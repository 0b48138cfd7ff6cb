//! Host preparation and daemon command construction.

use oci_build_core::config::DaemonConfig;
use oci_build_core::error::{BuildError, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// How the daemon process is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Run the daemon binary directly
    Direct,
    /// Run it under the rootless execution shim
    Rootless,
}

impl LaunchMode {
    /// Direct when privileged: the configured override, else euid 0.
    pub fn detect(config: &DaemonConfig) -> Self {
        let privileged = config
            .privileged
            .unwrap_or_else(crate::oci::running_as_root);
        if privileged {
            LaunchMode::Direct
        } else {
            LaunchMode::Rootless
        }
    }
}

/// Run the host preparation command, inheriting stdout.
pub(crate) fn run_setup(config: &DaemonConfig) -> Result<()> {
    let (program, args) = match config.setup_command.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };

    tracing::debug!(command = ?config.setup_command, "Preparing host");

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| BuildError::DaemonSetup {
            message: format!("{}: {}", program, e),
            hint: Some(format!("ensure {} is installed and on PATH", program)),
        })?;

    if !status.success() {
        return Err(BuildError::DaemonSetup {
            message: format!("{}: {}", program, status),
            hint: Some("the task may need to run with elevated privileges".to_string()),
        });
    }
    Ok(())
}

/// Daemon flags: configured extras, then `--root`, `--addr`, optional `--config`, `--debug`.
pub(crate) fn daemon_flags(config: &DaemonConfig, root: &Path, addr: &str) -> Vec<String> {
    let mut flags = config.daemon_args.clone();
    flags.push("--root".to_string());
    flags.push(root.display().to_string());
    flags.push("--addr".to_string());
    flags.push(addr.to_string());

    if let Some(file) = &config.config_file {
        flags.push("--config".to_string());
        flags.push(file.display().to_string());
    }
    if config.debug {
        flags.push("--debug".to_string());
    }
    flags
}

/// Command for `mode`, with the parent-death signal armed on Linux.
pub(crate) fn daemon_command(mode: LaunchMode, config: &DaemonConfig, flags: &[String]) -> Command {
    let mut command = match mode {
        LaunchMode::Direct => Command::new(&config.daemon_binary),
        LaunchMode::Rootless => {
            let mut command = Command::new(&config.rootless_binary);
            command.arg(&config.daemon_binary);
            command
        }
    };
    command.args(flags).stdin(Stdio::null());

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: prctl is async-signal-safe and only touches the child.
        unsafe {
            command.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    command
}
